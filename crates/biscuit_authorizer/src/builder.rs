//! String-level construction of Datalog content.
//!
//! The types here mirror the engine's data model with names instead of
//! interned ids. They are converted into a [`SymbolTable`] when added to an
//! [`crate::Authorizer`] or a [`crate::BlockBuilder`]. Validation (ground
//! facts, well-formed sets, bound variables) happens at that point.
//!
//! # Examples
//!
//! ```
//! use biscuit_authorizer::builder::{allow_if, fact, pred, string, var};
//!
//! let right = fact("right", &[string("file1"), string("read")]);
//! assert_eq!(right.to_string(), "right(\"file1\", \"read\")");
//!
//! let policy = allow_if(&[pred("resource", &[var("r")]), pred("right", &[var("r"), string("read")])]);
//! assert_eq!(
//!     policy.to_string(),
//!     "allow if resource($r), right($r, \"read\")"
//! );
//! ```

use biscuit_datalog::{self as datalog, CheckKind, PublicKey, SymbolTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

pub use biscuit_datalog::{Binary, Unary};

/// A Datalog value with string symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Variable(String),
    Integer(i64),
    Str(String),
    /// Seconds since the Unix epoch.
    Date(u64),
    Bytes(Vec<u8>),
    Bool(bool),
    Set(BTreeSet<Term>),
}

impl Term {
    pub fn convert(&self, symbols: &mut SymbolTable) -> datalog::Term {
        match self {
            Term::Variable(name) => datalog::Term::Variable(symbols.insert(name) as u32),
            Term::Integer(i) => datalog::Term::Integer(*i),
            Term::Str(s) => datalog::Term::Str(symbols.insert(s)),
            Term::Date(d) => datalog::Term::Date(*d),
            Term::Bytes(b) => datalog::Term::Bytes(b.clone()),
            Term::Bool(b) => datalog::Term::Bool(*b),
            Term::Set(s) => datalog::Term::Set(s.iter().map(|t| t.convert(symbols)).collect()),
        }
    }

    /// Resolves an engine term back to names.
    pub fn convert_from(term: &datalog::Term, symbols: &SymbolTable) -> Result<Self> {
        Ok(match term {
            datalog::Term::Variable(i) => Term::Variable(symbols.print_symbol(u64::from(*i))?),
            datalog::Term::Integer(i) => Term::Integer(*i),
            datalog::Term::Str(i) => Term::Str(symbols.print_symbol(*i)?),
            datalog::Term::Date(d) => Term::Date(*d),
            datalog::Term::Bytes(b) => Term::Bytes(b.clone()),
            datalog::Term::Bool(b) => Term::Bool(*b),
            datalog::Term::Set(s) => Term::Set(
                s.iter()
                    .map(|t| Term::convert_from(t, symbols))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Fails on sets holding variables or other sets.
    fn validate_set(&self) -> Result<()> {
        match self {
            Term::Set(s) => {
                if s.iter().any(|t| matches!(t, Term::Variable(_) | Term::Set(_))) {
                    return Err(Error::InvalidTerm(self.to_string()));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl From<i64> for Term {
    fn from(i: i64) -> Self {
        Term::Integer(i)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Str(s.to_string())
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Bool(b)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols = SymbolTable::new();
        let term = self.convert(&mut symbols);
        write!(f, "{}", symbols.print_term(&term))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    pub name: String,
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, terms: Vec<Term>) -> Self {
        Self {
            name: name.into(),
            terms,
        }
    }

    pub fn convert(&self, symbols: &mut SymbolTable) -> datalog::Predicate {
        let name = symbols.insert(&self.name);
        let terms = self.terms.iter().map(|t| t.convert(symbols)).collect();
        datalog::Predicate::new(name, terms)
    }

    pub fn convert_from(predicate: &datalog::Predicate, symbols: &SymbolTable) -> Result<Self> {
        Ok(Predicate {
            name: symbols.print_symbol(predicate.name)?,
            terms: predicate
                .terms
                .iter()
                .map(|t| Term::convert_from(t, symbols))
                .collect::<Result<_>>()?,
        })
    }

    fn variables(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| match t {
            Term::Variable(v) => Some(v.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols = SymbolTable::new();
        let predicate = self.convert(&mut symbols);
        write!(f, "{}", symbols.print_predicate(&predicate))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: Predicate,
}

impl Fact {
    pub fn new(name: impl Into<String>, terms: Vec<Term>) -> Self {
        Self {
            predicate: Predicate::new(name, terms),
        }
    }

    /// Fails if the fact holds a variable or an invalid set.
    pub fn validate(&self) -> Result<()> {
        for term in &self.predicate.terms {
            match term {
                Term::Variable(_) => return Err(Error::InvalidFact(self.to_string())),
                other => other.validate_set()?,
            }
        }
        Ok(())
    }

    /// Validates, then converts into `symbols`.
    pub fn convert(&self, symbols: &mut SymbolTable) -> Result<datalog::Fact> {
        self.validate()?;
        let predicate = self.predicate.convert(symbols);
        datalog::Fact::from_predicate(predicate).ok_or_else(|| Error::InvalidFact(self.to_string()))
    }

    pub fn convert_from(fact: &datalog::Fact, symbols: &SymbolTable) -> Result<Self> {
        Ok(Fact {
            predicate: Predicate::convert_from(&fact.predicate, symbols)?,
        })
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.predicate.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Value(Term),
    Unary(Unary),
    Binary(Binary),
}

/// A postfix expression program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    pub ops: Vec<Op>,
}

impl Expression {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn convert(&self, symbols: &mut SymbolTable) -> datalog::Expression {
        let ops = self
            .ops
            .iter()
            .map(|op| match op {
                Op::Value(t) => datalog::Op::Value(t.convert(symbols)),
                Op::Unary(u) => datalog::Op::Unary(*u),
                Op::Binary(b) => datalog::Op::Binary(*b),
            })
            .collect();
        datalog::Expression::new(ops)
    }

    fn variables(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            Op::Value(Term::Variable(v)) => Some(v.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols = SymbolTable::new();
        let expression = self.convert(&mut symbols);
        match expression.print(&symbols) {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "<invalid expression>"),
        }
    }
}

/// Trust annotation naming which blocks a rule may read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Authority,
    Previous,
    PublicKey(PublicKey),
}

impl Scope {
    pub fn convert(&self, symbols: &mut SymbolTable) -> datalog::Scope {
        match self {
            Scope::Authority => datalog::Scope::Authority,
            Scope::Previous => datalog::Scope::Previous,
            Scope::PublicKey(key) => datalog::Scope::PublicKey(symbols.public_keys_mut().insert(key)),
        }
    }
}

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

    /// Head and expression variables the body does not bind.
    pub fn free_variables(&self) -> Vec<String> {
        let bound: BTreeSet<&str> = self.body.iter().flat_map(Predicate::variables).collect();
        let free: BTreeSet<&str> = self
            .head
            .variables()
            .chain(self.expressions.iter().flat_map(Expression::variables))
            .filter(|v| !bound.contains(v))
            .collect();
        free.into_iter().map(|v| format!("${}", v)).collect()
    }

    /// Fails with [`Error::InvalidRule`] if a variable is unbound, or with
    /// [`Error::InvalidTerm`] if a set is malformed.
    pub fn validate(&self) -> Result<()> {
        let terms = self
            .head
            .terms
            .iter()
            .chain(self.body.iter().flat_map(|p| p.terms.iter()))
            .chain(self.expressions.iter().flat_map(|e| {
                e.ops.iter().filter_map(|op| match op {
                    Op::Value(t) => Some(t),
                    _ => None,
                })
            }));
        for term in terms {
            term.validate_set()?;
        }

        let free_variables = self.free_variables();
        if !free_variables.is_empty() {
            return Err(Error::InvalidRule {
                rule: self.to_string(),
                free_variables,
            });
        }
        Ok(())
    }

    /// Converts into `symbols` without validating.
    pub fn convert(&self, symbols: &mut SymbolTable) -> datalog::Rule {
        let head = self.head.convert(symbols);
        let body = self.body.iter().map(|p| p.convert(symbols)).collect();
        let expressions = self.expressions.iter().map(|e| e.convert(symbols)).collect();
        let scopes = self.scopes.iter().map(|s| s.convert(symbols)).collect();
        datalog::Rule::new(head, body, expressions, scopes)
    }

    /// Adds trust scopes to the rule.
    pub fn trusting(mut self, scopes: &[Scope]) -> Self {
        self.scopes.extend_from_slice(scopes);
        self
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols = SymbolTable::new();
        let rule = self.convert(&mut symbols);
        write!(f, "{}", symbols.print_rule(&rule))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Check {
    pub queries: Vec<Rule>,
    pub kind: CheckKind,
}

impl Check {
    pub fn validate(&self) -> Result<()> {
        self.queries.iter().try_for_each(Rule::validate)
    }

    pub fn convert(&self, symbols: &mut SymbolTable) -> datalog::Check {
        datalog::Check::new(
            self.kind,
            self.queries.iter().map(|q| q.convert(symbols)).collect(),
        )
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols = SymbolTable::new();
        let check = self.convert(&mut symbols);
        write!(f, "{}", symbols.print_check(&check))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    Allow,
    Deny,
}

/// An allow or deny decision guarded by alternative queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Policy {
    pub queries: Vec<Rule>,
    pub kind: PolicyKind,
}

impl Policy {
    pub fn validate(&self) -> Result<()> {
        self.queries.iter().try_for_each(Rule::validate)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            PolicyKind::Allow => "allow if",
            PolicyKind::Deny => "deny if",
        };
        let mut symbols = SymbolTable::new();
        let queries = self
            .queries
            .iter()
            .map(|q| {
                let rule = q.convert(&mut symbols);
                symbols.print_rule_body(&rule)
            })
            .collect::<Vec<_>>();
        if queries.is_empty() {
            write!(f, "{}", prefix)
        } else {
            write!(f, "{} {}", prefix, queries.join(" or "))
        }
    }
}

/// Creates a fact.
pub fn fact(name: &str, terms: &[Term]) -> Fact {
    Fact::new(name, terms.to_vec())
}

/// Creates a predicate.
pub fn pred(name: &str, terms: &[Term]) -> Predicate {
    Predicate::new(name, terms.to_vec())
}

/// Creates a rule without expressions.
pub fn rule(head_name: &str, head_terms: &[Term], body: &[Predicate]) -> Rule {
    constrained_rule(head_name, head_terms, body, &[])
}

/// Creates a rule with expressions.
pub fn constrained_rule(
    head_name: &str,
    head_terms: &[Term],
    body: &[Predicate],
    expressions: &[Expression],
) -> Rule {
    Rule::new(
        pred(head_name, head_terms),
        body.to_vec(),
        expressions.to_vec(),
        vec![],
    )
}

/// A query rule: `query() <- body`.
pub fn query(body: &[Predicate]) -> Rule {
    rule("query", &[], body)
}

/// A query rule with expressions.
pub fn constrained_query(body: &[Predicate], expressions: &[Expression]) -> Rule {
    constrained_rule("query", &[], body, expressions)
}

pub fn var(name: &str) -> Term {
    Term::Variable(name.to_string())
}

pub fn int(i: i64) -> Term {
    Term::Integer(i)
}

pub fn string(s: &str) -> Term {
    Term::Str(s.to_string())
}

/// A date term. Instants before the epoch clamp to 0.
pub fn date(t: &DateTime<Utc>) -> Term {
    Term::Date(u64::try_from(t.timestamp()).unwrap_or(0))
}

pub fn bytes(b: &[u8]) -> Term {
    Term::Bytes(b.to_vec())
}

pub fn boolean(b: bool) -> Term {
    Term::Bool(b)
}

pub fn set(terms: BTreeSet<Term>) -> Term {
    Term::Set(terms)
}

/// `check if body`.
pub fn check_if(body: &[Predicate]) -> Check {
    Check {
        queries: vec![query(body)],
        kind: CheckKind::One,
    }
}

/// `check all body`.
pub fn check_all(body: &[Predicate]) -> Check {
    Check {
        queries: vec![query(body)],
        kind: CheckKind::All,
    }
}

/// `reject if body`.
pub fn reject_if(body: &[Predicate]) -> Check {
    Check {
        queries: vec![query(body)],
        kind: CheckKind::Reject,
    }
}

/// `allow if body`.
pub fn allow_if(body: &[Predicate]) -> Policy {
    Policy {
        queries: vec![query(body)],
        kind: PolicyKind::Allow,
    }
}

/// `deny if body`.
pub fn deny_if(body: &[Predicate]) -> Policy {
    Policy {
        queries: vec![query(body)],
        kind: PolicyKind::Deny,
    }
}
