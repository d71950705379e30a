//! Biscuit Datalog - Provenance-Aware Evaluation Engine
//!
//! This crate provides the Datalog core used to authorize Biscuit tokens.
//! Every fact is tagged with the set of token blocks it depends on, and every
//! rule only reads facts coming from blocks it trusts, so a block appended by
//! an untrusted party cannot forge facts on behalf of the authority block.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Datalog Engine                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                      World                            │   │
//! │  │  Semi-naive Fixpoint │ Run Limits │ Queries           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                  Rules & Checks                       │   │
//! │  │  Backtracking Join │ Expression Filter │ Scopes       │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Storage                             │   │
//! │  │  Fact Arena │ Origins │ Symbol Table                  │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use biscuit_datalog::{Fact, Origin, Predicate, Rule, SymbolTable, Term, TrustedOrigins, World};
//!
//! let mut symbols = SymbolTable::new();
//! let resource = symbols.insert("resource");
//! let right = symbols.insert("right");
//! let allowed = symbols.insert("allowed");
//! let file = symbols.insert("file1");
//! let x = Term::Variable(symbols.insert("x") as u32);
//!
//! let mut world = World::new();
//! world.add_fact(&Origin::block(0), Fact::new(right, vec![Term::Str(file)]));
//! world.add_fact(&Origin::authorizer(), Fact::new(resource, vec![Term::Str(file)]));
//! world.add_rule(
//!     0,
//!     TrustedOrigins::default(),
//!     Rule::new(
//!         Predicate::new(allowed, vec![x.clone()]),
//!         vec![
//!             Predicate::new(resource, vec![x.clone()]),
//!             Predicate::new(right, vec![x]),
//!         ],
//!         vec![],
//!         vec![],
//!     ),
//! );
//!
//! world.run(&symbols).unwrap();
//! assert_eq!(world.facts().len(), 3);
//! ```

pub mod check;
pub mod error;
pub mod expression;
pub mod fact_set;
pub mod join;
pub mod limits;
pub mod origin;
pub mod rule;
pub mod symbol;
pub mod term;
pub mod world;

// Re-exports
pub use check::{Check, CheckKind};
pub use error::{Error, ExpressionError, Result, RunLimit};
pub use expression::{Binary, Expression, Op, Unary};
pub use fact_set::FactSet;
pub use limits::RunLimits;
pub use origin::{Origin, Scope, TrustedOrigins, AUTHORIZER_BLOCK};
pub use rule::Rule;
pub use symbol::{
    Algorithm, PublicKey, PublicKeys, SymbolIndex, SymbolTable, TemporarySymbolTable,
    DEFAULT_SYMBOLS, OFFSET,
};
pub use term::{Fact, Predicate, Term};
pub use world::{RuleEntry, World, WorldState};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
