//! Biscuit Authorizer - Check and Policy Evaluation
//!
//! This crate decides whether a verified Biscuit token grants a request.
//! The token's blocks and the authorizer's own facts, rules, checks and
//! policies are loaded into a provenance-aware Datalog world; the world is
//! saturated under resource limits, and the decision follows from the checks
//! and the first matching policy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Authorizer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                    Inputs                             │   │
//! │  │  Token Blocks │ Authorizer Facts/Rules │ Scopes       │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              biscuit_datalog::World                   │   │
//! │  │  Symbol Translation │ Trusted Origins │ Fixpoint      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Decision                            │   │
//! │  │  Block Checks │ Authorizer Checks │ Policies          │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use biscuit_authorizer::builder::{allow_if, check_if, fact, pred, string, var};
//! use biscuit_authorizer::{Authorizer, BlockBuilder, Token};
//!
//! let mut authority = BlockBuilder::new();
//! authority.add_fact(fact("right", &[string("file1"), string("read")])).unwrap();
//! let token = Token::new(authority.build().unwrap());
//!
//! let mut authorizer = Authorizer::new();
//! authorizer.add_token(&token).unwrap();
//! authorizer.add_fact(fact("resource", &[string("file1")])).unwrap();
//! authorizer.add_fact(fact("operation", &[string("read")])).unwrap();
//! authorizer
//!     .add_check(check_if(&[pred("operation", &[string("read")])]))
//!     .unwrap();
//! authorizer
//!     .add_policy(allow_if(&[
//!         pred("resource", &[var("r")]),
//!         pred("operation", &[var("op")]),
//!         pred("right", &[var("r"), var("op")]),
//!     ]))
//!     .unwrap();
//!
//! assert_eq!(authorizer.authorize(), Ok(0));
//! ```

pub mod authorizer;
pub mod block;
pub mod builder;
pub mod dump;
pub mod error;

// Re-exports
pub use authorizer::Authorizer;
pub use block::{Block, BlockBuilder, Token, MAX_SCHEMA_VERSION, MIN_SCHEMA_VERSION};
pub use dump::AuthorizerDump;
pub use error::{Error, FailedCheck, Logic, MatchedPolicy, Result};

pub use biscuit_datalog::{PublicKey, RunLimit, RunLimits};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
