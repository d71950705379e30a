//! Rules: Horn clauses with expression constraints and trust scopes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;
use std::time::Instant;

use crate::error::Result;
use crate::expression::{filter, Expression, Filter};
use crate::fact_set::FactSet;
use crate::join::{body_variables, Join, MatchedVariables};
use crate::origin::{Origin, Scope, TrustedOrigins};
use crate::symbol::SymbolTable;
use crate::term::{Fact, Predicate, Term};

/// `head <- body, expressions trusting scopes`.
///
/// A rule is well formed when every variable of the head and of the
/// expressions also appears in the body; see [`Rule::free_variables`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub head: Predicate,
    pub body: Vec<Predicate>,
    pub expressions: Vec<Expression>,
    pub scopes: Vec<Scope>,
}

impl Rule {
    pub fn new(
        head: Predicate,
        body: Vec<Predicate>,
        expressions: Vec<Expression>,
        scopes: Vec<Scope>,
    ) -> Self {
        Self {
            head,
            body,
            expressions,
            scopes,
        }
    }

    /// Head and expression variables that no body predicate binds.
    pub fn free_variables(&self) -> BTreeSet<u32> {
        let bound = body_variables(&self.body);
        self.head
            .variables()
            .chain(self.expressions.iter().flat_map(Expression::variables))
            .filter(|v| !bound.contains(v))
            .collect()
    }

    pub fn is_well_formed(&self) -> bool {
        self.free_variables().is_empty()
    }

    /// Derives every head fact the body supports.
    ///
    /// Each result is tagged with the union of the origins of the facts it
    /// was derived from plus `rule_origin`. With `delta`, only derivations
    /// using a fact at or after that arena index are produced.
    ///
    /// # Arguments
    ///
    /// * `facts` - The fact set to match against.
    /// * `rule_origin` - The block the rule was declared in.
    /// * `trusted` - Origins the body may read.
    /// * `symbols` - Symbol table used by string expressions.
    /// * `delta` - Arena index of the first fact of the previous pass, if any.
    /// * `deadline` - Instant after which evaluation fails with `Timeout`.
    pub fn apply(
        &self,
        facts: &FactSet,
        rule_origin: usize,
        trusted: &TrustedOrigins,
        symbols: &SymbolTable,
        delta: Option<usize>,
        deadline: Option<Instant>,
    ) -> Result<Vec<(Origin, Fact)>> {
        let mut derived = Vec::new();
        let join = self.join(facts, trusted, deadline).with_delta(delta);

        join.run(self.matched_variables(), &mut |binding, origin| {
            if filter(&self.expressions, &binding, symbols)? == Filter::Reject {
                return Ok(ControlFlow::Continue(()));
            }
            if let Some(fact) = self.instantiate_head(&binding) {
                let mut origin = origin;
                origin.insert(rule_origin);
                derived.push((origin, fact));
            }
            Ok(ControlFlow::Continue(()))
        })?;

        Ok(derived)
    }

    /// Returns `true` as soon as one binding of the body passes every
    /// expression.
    pub fn find_match(
        &self,
        facts: &FactSet,
        trusted: &TrustedOrigins,
        symbols: &SymbolTable,
        deadline: Option<Instant>,
    ) -> Result<bool> {
        let flow = self
            .join(facts, trusted, deadline)
            .run(self.matched_variables(), &mut |binding, _| {
                Ok(match filter(&self.expressions, &binding, symbols)? {
                    Filter::Keep => ControlFlow::Break(()),
                    Filter::Reject => ControlFlow::Continue(()),
                })
            })?;
        Ok(flow.is_break())
    }

    pub fn translate(&self, from: &SymbolTable, to: &mut SymbolTable) -> Result<Rule> {
        Ok(Rule {
            head: self.head.translate(from, to)?,
            body: self
                .body
                .iter()
                .map(|p| p.translate(from, to))
                .collect::<Result<_>>()?,
            expressions: self
                .expressions
                .iter()
                .map(|e| e.translate(from, to))
                .collect::<Result<_>>()?,
            scopes: self
                .scopes
                .iter()
                .map(|s| translate_scope(s, from, to))
                .collect::<Result<_>>()?,
        })
    }

    fn join<'a>(
        &'a self,
        facts: &'a FactSet,
        trusted: &'a TrustedOrigins,
        deadline: Option<Instant>,
    ) -> Join<'a> {
        let join = Join::new(&self.body, facts, trusted);
        match deadline {
            Some(deadline) => join.with_deadline(deadline),
            None => join,
        }
    }

    fn matched_variables(&self) -> MatchedVariables {
        MatchedVariables::new(body_variables(&self.body))
    }

    fn instantiate_head(&self, binding: &HashMap<u32, Term>) -> Option<Fact> {
        let terms = self
            .head
            .terms
            .iter()
            .map(|t| match t {
                Term::Variable(v) => binding.get(v).cloned(),
                ground => Some(ground.clone()),
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Fact::new(self.head.name, terms))
    }
}

/// Moves a public key scope from the key table of `from` into `to`.
pub fn translate_scope(scope: &Scope, from: &SymbolTable, to: &mut SymbolTable) -> Result<Scope> {
    Ok(match scope {
        Scope::PublicKey(id) => {
            let key = from
                .public_keys()
                .get_key(*id)
                .ok_or(crate::Error::UnknownPublicKey(*id))?
                .clone();
            Scope::PublicKey(to.public_keys_mut().insert(&key))
        }
        other => *other,
    })
}
