//! Unification and the backtracking join.
//!
//! [`Join`] walks a rule body left to right. For each predicate it scans the
//! trusted facts of the same shape, extends the current binding with each
//! fact that unifies, and recurses into the remaining predicates. Complete
//! bindings are handed to a callback together with the union of the origins
//! of the facts that produced them; the callback decides whether the walk
//! continues, so yes/no queries stop at the first match.

use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;
use std::time::Instant;

use crate::error::{Result, RunLimit};
use crate::fact_set::FactSet;
use crate::origin::{Origin, TrustedOrigins};
use crate::term::{Fact, Predicate, Term};

/// A partial assignment of the variables of one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedVariables(HashMap<u32, Option<Term>>);

impl MatchedVariables {
    /// Creates an assignment where every variable of `variables` is unbound.
    pub fn new(variables: impl IntoIterator<Item = u32>) -> Self {
        MatchedVariables(variables.into_iter().map(|v| (v, None)).collect())
    }

    /// Binds `key` to `value`. Returns `false` if `key` is already bound to a
    /// different value.
    pub fn insert(&mut self, key: u32, value: &Term) -> bool {
        match self.0.get_mut(&key) {
            Some(Some(existing)) => existing == value,
            Some(slot @ None) => {
                *slot = Some(value.clone());
                true
            }
            None => {
                self.0.insert(key, Some(value.clone()));
                true
            }
        }
    }

    pub fn get(&self, key: u32) -> Option<&Term> {
        self.0.get(&key).and_then(Option::as_ref)
    }

    /// The full binding, or `None` if a variable is still unbound.
    pub fn complete(&self) -> Option<HashMap<u32, Term>> {
        self.0
            .iter()
            .map(|(k, v)| v.as_ref().map(|v| (*k, v.clone())))
            .collect()
    }
}

/// Binds the variables of `predicate` against `fact`.
///
/// Returns `false` if a ground term differs or a variable would take two
/// values. `variables` is left partially updated on failure, so callers work
/// on a clone.
pub fn unify(predicate: &Predicate, fact: &Fact, variables: &mut MatchedVariables) -> bool {
    if !predicate.matches(&fact.predicate) {
        return false;
    }

    predicate
        .terms
        .iter()
        .zip(&fact.predicate.terms)
        .all(|(term, value)| match term {
            Term::Variable(v) => variables.insert(*v, value),
            _ => true,
        })
}

/// Callback receiving each complete binding with its origin.
pub type OnMatch<'f> = dyn FnMut(HashMap<u32, Term>, Origin) -> Result<ControlFlow<()>> + 'f;

/// A conjunctive join over a [`FactSet`].
pub struct Join<'a> {
    predicates: &'a [Predicate],
    facts: &'a FactSet,
    trusted: &'a TrustedOrigins,
    delta: Option<usize>,
    deadline: Option<Instant>,
}

impl<'a> Join<'a> {
    pub fn new(predicates: &'a [Predicate], facts: &'a FactSet, trusted: &'a TrustedOrigins) -> Self {
        Self {
            predicates,
            facts,
            trusted,
            delta: None,
            deadline: None,
        }
    }

    /// Only reports bindings that use at least one fact whose arena index is
    /// `first_new` or greater.
    pub fn with_delta(mut self, first_new: Option<usize>) -> Self {
        self.delta = first_new;
        self
    }

    /// Aborts with [`RunLimit::Timeout`] once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Walks every binding, calling `on_match` for each complete one.
    ///
    /// `variables` must declare every variable of the rule; bindings that
    /// leave one unbound are dropped.
    pub fn run(&self, variables: MatchedVariables, on_match: &mut OnMatch<'_>) -> Result<ControlFlow<()>> {
        self.step(0, &variables, Origin::default(), false, on_match)
    }

    /// Collects every binding into a set of `(origin, binding)` pairs.
    pub fn collect(&self, variables: MatchedVariables) -> Result<Vec<(Origin, HashMap<u32, Term>)>> {
        let mut out = Vec::new();
        self.run(variables, &mut |binding, origin| {
            out.push((origin, binding));
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(out)
    }

    /// Returns `true` as soon as one binding exists.
    pub fn exists(&self, variables: MatchedVariables) -> Result<bool> {
        let flow = self.run(variables, &mut |_, _| Ok(ControlFlow::Break(())))?;
        Ok(flow.is_break())
    }

    fn step(
        &self,
        depth: usize,
        variables: &MatchedVariables,
        origin: Origin,
        used_delta: bool,
        on_match: &mut OnMatch<'_>,
    ) -> Result<ControlFlow<()>> {
        let Some(predicate) = self.predicates.get(depth) else {
            if self.delta.is_some() && !used_delta {
                return Ok(ControlFlow::Continue(()));
            }
            return match variables.complete() {
                Some(binding) => on_match(binding, origin),
                None => Ok(ControlFlow::Continue(())),
            };
        };

        for (index, fact_origin, fact) in self.facts.candidates(predicate, self.trusted) {
            self.check_deadline()?;

            let mut extended = variables.clone();
            if !unify(predicate, fact, &mut extended) {
                continue;
            }

            let used = used_delta || self.delta.is_some_and(|first_new| index >= first_new);
            let flow = self.step(depth + 1, &extended, origin.union(fact_origin), used, on_match)?;
            if flow.is_break() {
                return Ok(flow);
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(RunLimit::Timeout.into()),
            _ => Ok(()),
        }
    }
}

/// Distinct variables of a rule body.
pub fn body_variables(body: &[Predicate]) -> BTreeSet<u32> {
    body.iter().flat_map(Predicate::variables).collect()
}
