//! Terms, predicates and facts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::symbol::{SymbolIndex, SymbolTable};

/// A Datalog value.
///
/// `Str` holds an interned [`SymbolIndex`]; `Variable` holds the interned id
/// of the variable's name. Sets never contain variables or other sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Variable(u32),
    Integer(i64),
    Str(SymbolIndex),
    /// Seconds since the Unix epoch.
    Date(u64),
    Bytes(Vec<u8>),
    Bool(bool),
    Set(BTreeSet<Term>),
}

impl Term {
    /// Returns `true` if the term contains no variable.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Variable(_) => false,
            Term::Set(s) => s.iter().all(Term::is_ground),
            _ => true,
        }
    }

    /// Returns `true` for a set whose elements are ground, non-set terms.
    pub fn is_valid_set(set: &BTreeSet<Term>) -> bool {
        set.iter()
            .all(|t| !matches!(t, Term::Variable(_) | Term::Set(_)))
    }

    /// Rewrites the term's symbol ids from the `from` table into `to`.
    pub fn translate(&self, from: &SymbolTable, to: &mut SymbolTable) -> Result<Term> {
        Ok(match self {
            Term::Variable(i) => {
                let name = from.print_symbol(u64::from(*i))?;
                Term::Variable(variable_id(to.insert(&name))?)
            }
            Term::Str(i) => {
                let s = from.print_symbol(*i)?;
                Term::Str(to.insert(&s))
            }
            Term::Set(s) => {
                if !Term::is_valid_set(s) {
                    return Err(Error::InvalidSet(from.print_term(self)));
                }
                Term::Set(
                    s.iter()
                        .map(|t| t.translate(from, to))
                        .collect::<Result<_>>()?,
                )
            }
            other => other.clone(),
        })
    }
}

/// Narrows a symbol id to the `u32` range used for variables.
pub fn variable_id(index: SymbolIndex) -> Result<u32> {
    u32::try_from(index).map_err(|_| Error::UnknownSymbol(index))
}

/// A named, ordered tuple of terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Predicate {
    pub name: SymbolIndex,
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn new(name: SymbolIndex, terms: Vec<Term>) -> Self {
        Self { name, terms }
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_ground)
    }

    /// Ids of the variables appearing in this predicate.
    pub fn variables(&self) -> impl Iterator<Item = u32> + '_ {
        self.terms.iter().filter_map(|t| match t {
            Term::Variable(v) => Some(*v),
            _ => None,
        })
    }

    /// Returns `true` if `fact` has the same name and arity, and every ground
    /// position of this predicate is equal to the fact's term.
    pub fn matches(&self, fact: &Predicate) -> bool {
        self.name == fact.name
            && self.arity() == fact.arity()
            && self
                .terms
                .iter()
                .zip(&fact.terms)
                .all(|(t, f)| matches!(t, Term::Variable(_)) || t == f)
    }

    pub fn translate(&self, from: &SymbolTable, to: &mut SymbolTable) -> Result<Predicate> {
        let name = from.print_symbol(self.name)?;
        Ok(Predicate {
            name: to.insert(&name),
            terms: self
                .terms
                .iter()
                .map(|t| t.translate(from, to))
                .collect::<Result<_>>()?,
        })
    }
}

/// A ground predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: Predicate,
}

impl Fact {
    /// Creates a fact from terms the caller knows to be ground.
    pub fn new(name: SymbolIndex, terms: Vec<Term>) -> Self {
        Self {
            predicate: Predicate::new(name, terms),
        }
    }

    /// Creates a fact, returning `None` if the predicate has a variable.
    pub fn from_predicate(predicate: Predicate) -> Option<Self> {
        predicate.is_ground().then_some(Self { predicate })
    }

    pub fn translate(&self, from: &SymbolTable, to: &mut SymbolTable) -> Result<Fact> {
        let predicate = self.predicate.translate(from, to)?;
        Fact::from_predicate(predicate).ok_or_else(|| Error::NonGroundFact(from.print_fact(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groundness() {
        assert!(Term::Integer(1).is_ground());
        assert!(!Term::Variable(0).is_ground());

        let p = Predicate::new(1, vec![Term::Integer(1), Term::Variable(7)]);
        assert!(!p.is_ground());
        assert_eq!(p.variables().collect::<Vec<_>>(), vec![7]);
        assert!(Fact::from_predicate(p).is_none());
    }

    #[test]
    fn test_predicate_shape_matching() {
        let pattern = Predicate::new(4, vec![Term::Variable(0), Term::Integer(1)]);
        assert!(pattern.matches(&Predicate::new(4, vec![Term::Integer(9), Term::Integer(1)])));
        assert!(!pattern.matches(&Predicate::new(4, vec![Term::Integer(9), Term::Integer(2)])));
        // arity is part of identity
        assert!(!pattern.matches(&Predicate::new(4, vec![Term::Integer(9)])));
        assert!(!pattern.matches(&Predicate::new(5, vec![Term::Integer(9), Term::Integer(1)])));
    }

    #[test]
    fn test_translate_between_tables() {
        let mut from = SymbolTable::new();
        let name = from.insert("file");
        let value = from.insert("a.txt");
        let var = from.insert("x");
        let fact = Predicate::new(name, vec![Term::Str(value), Term::Variable(var as u32)]);

        let mut to = SymbolTable::new();
        to.insert("unrelated");
        let translated = fact.translate(&from, &mut to).unwrap();

        assert_eq!(to.print_predicate(&translated), "file(\"a.txt\", $x)");
        assert_ne!(translated.name, name);
    }

    #[test]
    fn test_translate_rejects_unknown_symbols() {
        let from = SymbolTable::new();
        let mut to = SymbolTable::new();
        let err = Term::Str(5000).translate(&from, &mut to);
        assert_eq!(err, Err(Error::UnknownSymbol(5000)));
    }

    #[test]
    fn test_translate_rejects_nested_sets() {
        let from = SymbolTable::new();
        let mut to = SymbolTable::new();
        let inner: BTreeSet<Term> = [Term::Integer(1)].into_iter().collect();
        let outer: BTreeSet<Term> = [Term::Set(inner)].into_iter().collect();
        assert!(matches!(
            Term::Set(outer).translate(&from, &mut to),
            Err(Error::InvalidSet(_))
        ));
    }
}
