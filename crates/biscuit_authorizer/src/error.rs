//! Error types for the Biscuit authorizer.

use biscuit_datalog::{ExpressionError, RunLimit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A specialized `Result` type for authorizer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors that can occur while loading content into an
/// authorizer or reaching a decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Authorization ran to completion and denied the request.
    #[error("authorization failed: {0}")]
    FailedLogic(#[from] Logic),

    /// Evaluation stopped on a resource limit.
    #[error("run limit exceeded: {0}")]
    RunLimit(#[from] RunLimit),

    /// An expression program was malformed.
    #[error("expression execution failed: {0}")]
    Execution(ExpressionError),

    /// A rule, check or policy uses variables its body does not bind.
    #[error("rule {rule} has unbound variables: {}", .free_variables.join(", "))]
    InvalidRule {
        rule: String,
        free_variables: Vec<String>,
    },

    /// A fact contains a variable.
    #[error("invalid fact: {0}")]
    InvalidFact(String),

    /// A term is not allowed where it appears (nested set, variable in a set).
    #[error("invalid term: {0}")]
    InvalidTerm(String),

    /// Block content references an unknown symbol or public key.
    #[error("format error: {0}")]
    Format(String),

    /// A token was already loaded into this authorizer.
    #[error("the authorizer already contains a token")]
    AuthorizerNotEmpty,

    /// The world dump could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Why a complete evaluation refused the request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Logic {
    /// A token block contains a rule with unbound head or expression variables.
    #[error("block {block_id} contains an invalid rule: {rule}")]
    InvalidBlockRule { block_id: usize, rule: String },

    /// A policy matched but it was a deny, or some check failed.
    #[error("policy {policy:?} matched with {} failed checks", .checks.len())]
    Unauthorized {
        policy: MatchedPolicy,
        checks: Vec<FailedCheck>,
    },

    /// No policy matched.
    #[error("no matching policy, {} failed checks", .checks.len())]
    NoMatchingPolicy { checks: Vec<FailedCheck> },
}

/// The first policy that matched, by declaration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchedPolicy {
    Allow(usize),
    Deny(usize),
}

/// A check that did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailedCheck {
    /// A check carried by token block `block_id`.
    Block {
        block_id: usize,
        check_id: usize,
        rule: String,
    },
    /// A check added to the authorizer.
    Authorizer { check_id: usize, rule: String },
}

impl From<biscuit_datalog::Error> for Error {
    fn from(e: biscuit_datalog::Error) -> Self {
        use biscuit_datalog::Error as Datalog;
        match e {
            Datalog::RunLimit(limit) => Error::RunLimit(limit),
            Datalog::Execution(e) => Error::Execution(e),
            Datalog::NonGroundFact(fact) => Error::InvalidFact(fact),
            Datalog::InvalidSet(term) => Error::InvalidTerm(term),
            other @ (Datalog::UnknownSymbol(_)
            | Datalog::UnknownPublicKey(_)
            | Datalog::DefaultSymbolRedefined(_)) => Error::Format(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
