//! Error types for the Datalog engine.

use thiserror::Error;

/// A specialized `Result` type for Datalog engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors that can occur while translating, evaluating or running
/// Datalog programs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The fixpoint or a query did not complete within the configured bounds.
    #[error("run limit exceeded: {0}")]
    RunLimit(#[from] RunLimit),

    /// An expression program was malformed and could not be executed.
    #[error("expression execution failed: {0}")]
    Execution(ExpressionError),

    /// A symbol id does not resolve in the symbol table it was read from.
    #[error("unknown symbol id {0}")]
    UnknownSymbol(u64),

    /// A public key id does not resolve in the public key table it was read from.
    #[error("unknown public key id {0}")]
    UnknownPublicKey(u64),

    /// A set term contains a variable or another set.
    #[error("invalid set term: {0}")]
    InvalidSet(String),

    /// A fact contains a variable.
    #[error("fact is not ground: {0}")]
    NonGroundFact(String),

    /// A symbol table fragment redefines one of the built-in symbols.
    #[error("symbol table redefines the built-in symbol {0:?}")]
    DefaultSymbolRedefined(String),
}

/// The resource limit that interrupted an evaluation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// The configured maximum number of facts was exceeded.
    #[error("too many facts generated")]
    TooManyFacts,

    /// The fixpoint did not converge within the configured number of iterations.
    #[error("too many engine iterations")]
    TooManyIterations,

    /// The configured time budget elapsed.
    #[error("spent too much time evaluating")]
    Timeout,
}

/// Failures raised by the expression stack machine.
///
/// Only [`ExpressionError::InvalidStack`] is fatal; every other variant
/// disqualifies the binding being filtered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// A string symbol could not be resolved.
    #[error("unknown symbol {0}")]
    UnknownSymbol(u64),

    /// A variable referenced by the expression is not bound.
    #[error("unknown variable {0}")]
    UnknownVariable(u32),

    /// The operands have types the operator does not accept.
    #[error("invalid operand types")]
    InvalidType,

    /// Integer division by zero.
    #[error("division by zero")]
    DivideByZero,

    /// The regular expression operand does not compile.
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),

    /// The op program underflowed or did not leave exactly one value.
    #[error("invalid stack state")]
    InvalidStack,
}

impl ExpressionError {
    /// Returns `true` if this failure must abort the whole evaluation rather
    /// than only rejecting the current binding.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExpressionError::InvalidStack)
    }
}
