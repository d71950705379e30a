//! Checks: yes/no queries over a converged world.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::Result;
use crate::origin::TrustedOrigins;
use crate::rule::Rule;
use crate::symbol::SymbolTable;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    /// Passes if at least one query matches.
    One,
    /// Passes if every query matches.
    All,
    /// Passes if no query matches.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Check {
    pub queries: Vec<Rule>,
    pub kind: CheckKind,
}

impl Check {
    pub fn new(kind: CheckKind, queries: Vec<Rule>) -> Self {
        Self { queries, kind }
    }

    /// Runs the check against `world`.
    ///
    /// `trusted_for` yields the origins each query may read. An empty query
    /// list fails a `One` check and passes `All` and `Reject` checks.
    pub fn evaluate(
        &self,
        world: &World,
        symbols: &SymbolTable,
        deadline: Option<Instant>,
        trusted_for: impl Fn(&Rule) -> TrustedOrigins,
    ) -> Result<bool> {
        let mut matches = self
            .queries
            .iter()
            .map(|query| world.query_match(query, &trusted_for(query), symbols, deadline));

        match self.kind {
            CheckKind::One => first_true(&mut matches),
            CheckKind::All => Ok(!first_true(&mut matches.map(|m| m.map(|found| !found)))?),
            CheckKind::Reject => Ok(!first_true(&mut matches)?),
        }
    }

    pub fn translate(&self, from: &SymbolTable, to: &mut SymbolTable) -> Result<Check> {
        Ok(Check {
            queries: self
                .queries
                .iter()
                .map(|q| q.translate(from, to))
                .collect::<Result<_>>()?,
            kind: self.kind,
        })
    }
}

/// Short-circuits on the first `Ok(true)` or error.
fn first_true(results: &mut impl Iterator<Item = Result<bool>>) -> Result<bool> {
    for result in results {
        if result? {
            return Ok(true);
        }
    }
    Ok(false)
}
