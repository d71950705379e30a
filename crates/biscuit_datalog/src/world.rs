//! The World: facts, rules and the bounded fixpoint driver.
//!
//! A [`World`] accumulates facts and rules, each tagged with the block they
//! came from, and saturates the fact set by forward chaining. The first pass
//! applies every rule to every visible fact; later passes are semi-naive and
//! only consider derivations that use at least one fact produced by the pass
//! before. The loop stops when a pass adds nothing or a [`RunLimits`] bound
//! is hit.

use indexmap::IndexSet;
use log::{debug, trace};
use std::time::Instant;

use crate::error::{Error, Result, RunLimit};
use crate::fact_set::FactSet;
use crate::limits::RunLimits;
use crate::origin::{Origin, TrustedOrigins};
use crate::rule::Rule;
use crate::symbol::SymbolTable;
use crate::term::Fact;

/// A rule together with where it was declared and what it may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    /// Block the rule was declared in ([`crate::AUTHORIZER_BLOCK`] for the authorizer).
    pub origin: usize,
    pub trusted: TrustedOrigins,
    pub rule: Rule,
}

/// Lifecycle of a [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorldState {
    /// Content was added since the last run.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// The last run reached a fixpoint.
    Converged,
    /// The last run stopped on a resource limit.
    LimitExceeded(RunLimit),
}

/// Owns the fact set and rule set of one authorization.
#[derive(Debug, Clone, Default)]
pub struct World {
    facts: FactSet,
    rules: Vec<RuleEntry>,
    iterations: u64,
    state: WorldState,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `fact` under `origin`. Returns `false` if it was already stored
    /// under that exact origin.
    pub fn add_fact(&mut self, origin: &Origin, fact: Fact) -> bool {
        self.state = WorldState::Idle;
        self.facts.insert(origin, fact)
    }

    /// Registers a rule.
    ///
    /// # Arguments
    ///
    /// * `origin` - The block the rule was declared in.
    /// * `trusted` - The origins the rule body may read.
    /// * `rule` - The rule itself, already in the session symbol space.
    pub fn add_rule(&mut self, origin: usize, trusted: TrustedOrigins, rule: Rule) {
        self.state = WorldState::Idle;
        self.rules.push(RuleEntry {
            origin,
            trusted,
            rule,
        });
    }

    /// Recomputes the trusted origins of every rule declared in `origin`.
    /// The world goes back to `Idle` if any of them changed.
    pub fn update_trust<F>(&mut self, origin: usize, trusted_for: F)
    where
        F: Fn(&Rule) -> TrustedOrigins,
    {
        for entry in self.rules.iter_mut().filter(|e| e.origin == origin) {
            let trusted = trusted_for(&entry.rule);
            if trusted != entry.trusted {
                trace!("rule trust updated for block {}", origin);
                entry.trusted = trusted;
                self.state = WorldState::Idle;
            }
        }
    }

    pub fn facts(&self) -> &FactSet {
        &self.facts
    }

    pub fn rules(&self) -> &[RuleEntry] {
        &self.rules
    }

    pub fn state(&self) -> WorldState {
        self.state
    }

    /// Number of passes performed by the last run.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Runs to a fixpoint with the default [`RunLimits`].
    pub fn run(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.run_with_limits(symbols, RunLimits::default())
    }

    /// Runs to a fixpoint, with the time budget starting now.
    pub fn run_with_limits(&mut self, symbols: &SymbolTable, limits: RunLimits) -> Result<()> {
        let deadline = limits.deadline_from(Instant::now());
        self.run_until(symbols, &limits, deadline)
    }

    /// Runs to a fixpoint.
    ///
    /// # Arguments
    ///
    /// * `symbols` - The session symbol table.
    /// * `limits` - Fact and iteration bounds. `max_time` is ignored in
    ///   favour of `deadline`.
    /// * `deadline` - Instant after which the run fails with `Timeout`.
    ///   `None` leaves the run bounded by facts and iterations only.
    ///
    /// # Returns
    ///
    /// `Ok(())` once a pass derives nothing new, or `Error::RunLimit` when a
    /// bound is hit. Facts derived before the limit stay in the world.
    pub fn run_until(
        &mut self,
        symbols: &SymbolTable,
        limits: &RunLimits,
        deadline: Option<Instant>,
    ) -> Result<()> {
        self.state = WorldState::Running;
        self.iterations = 0;
        let mut delta: Option<usize> = None;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.stop(RunLimit::Timeout.into()));
            }

            let mark = self.facts.len();
            let pending = match self.pass(symbols, delta, deadline) {
                Ok(pending) => pending,
                Err(e) => return Err(self.stop(e)),
            };
            self.iterations += 1;

            let added = pending
                .into_iter()
                .filter(|(origin, fact)| self.facts.insert(origin, fact.clone()))
                .count();
            trace!(
                "pass {} added {} facts ({} total)",
                self.iterations,
                added,
                self.facts.len()
            );

            if added == 0 {
                debug!(
                    "world converged after {} passes with {} facts",
                    self.iterations,
                    self.facts.len()
                );
                self.state = WorldState::Converged;
                return Ok(());
            }

            if self.facts.len() as u64 > limits.max_facts {
                return Err(self.stop(RunLimit::TooManyFacts.into()));
            }

            if self.iterations >= limits.max_iterations {
                return Err(self.stop(RunLimit::TooManyIterations.into()));
            }

            delta = Some(mark);
        }
    }

    /// Applies every rule once, returning the derivations not yet stored.
    fn pass(
        &self,
        symbols: &SymbolTable,
        delta: Option<usize>,
        deadline: Option<Instant>,
    ) -> Result<IndexSet<(Origin, Fact)>> {
        let mut pending = IndexSet::new();
        for entry in &self.rules {
            let derived = entry.rule.apply(
                &self.facts,
                entry.origin,
                &entry.trusted,
                symbols,
                delta,
                deadline,
            )?;
            pending.extend(
                derived
                    .into_iter()
                    .filter(|(origin, fact)| !self.facts.contains(origin, fact)),
            );
        }
        Ok(pending)
    }

    fn stop(&mut self, error: Error) -> Error {
        self.state = match &error {
            Error::RunLimit(limit) => {
                debug!("world run stopped after {} passes: {}", self.iterations, limit);
                WorldState::LimitExceeded(*limit)
            }
            _ => WorldState::Idle,
        };
        error
    }

    /// Evaluates `rule` once against the current facts without storing the
    /// results.
    ///
    /// # Arguments
    ///
    /// * `rule` - The query.
    /// * `origin` - The block the query is attributed to.
    /// * `trusted` - The origins the query may read.
    /// * `symbols` - The session symbol table.
    /// * `deadline` - Optional instant after which the query fails with `Timeout`.
    pub fn query_rule(
        &self,
        rule: &Rule,
        origin: usize,
        trusted: &TrustedOrigins,
        symbols: &SymbolTable,
        deadline: Option<Instant>,
    ) -> Result<FactSet> {
        let mut results = FactSet::new();
        for (origin, fact) in rule.apply(&self.facts, origin, trusted, symbols, None, deadline)? {
            results.insert(&origin, fact);
        }
        Ok(results)
    }

    /// Returns `true` if `rule` has at least one matching binding.
    pub fn query_match(
        &self,
        rule: &Rule,
        trusted: &TrustedOrigins,
        symbols: &SymbolTable,
        deadline: Option<Instant>,
    ) -> Result<bool> {
        rule.find_match(&self.facts, trusted, symbols, deadline)
    }
}
