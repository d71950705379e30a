//! Provenance-partitioned fact storage.
//!
//! Facts live in a flat, append-only arena of `(Origin, Fact)` entries. An
//! entry's position never changes, which lets the fixpoint driver describe
//! "facts added since pass N" as an index range. Two side indexes speed up
//! the common lookups: by predicate shape (name, arity) for the join, and by
//! origin for dumps.

use indexmap::IndexSet;
use std::collections::{BTreeMap, HashMap};

use crate::origin::{Origin, TrustedOrigins};
use crate::symbol::SymbolIndex;
use crate::term::{Fact, Predicate};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Entry {
    origin: Origin,
    fact: Fact,
}

/// Append-only store of facts tagged with their origin.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    entries: IndexSet<Entry>,
    by_shape: HashMap<(SymbolIndex, usize), Vec<usize>>,
    by_origin: BTreeMap<Origin, Vec<usize>>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `fact` under `origin`. Returns `false` if that exact pair was
    /// already present.
    pub fn insert(&mut self, origin: &Origin, fact: Fact) -> bool {
        let shape = (fact.predicate.name, fact.predicate.arity());
        let (index, inserted) = self.entries.insert_full(Entry {
            origin: origin.clone(),
            fact,
        });
        if inserted {
            self.by_shape.entry(shape).or_default().push(index);
            self.by_origin.entry(origin.clone()).or_default().push(index);
        }
        inserted
    }

    pub fn contains(&self, origin: &Origin, fact: &Fact) -> bool {
        self.entries.contains(&Entry {
            origin: origin.clone(),
            fact: fact.clone(),
        })
    }

    /// Number of `(origin, fact)` entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<(&Origin, &Fact)> {
        self.entries.get_index(index).map(|e| (&e.origin, &e.fact))
    }

    /// Every entry, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Origin, &Fact)> {
        self.entries.iter().map(|e| (&e.origin, &e.fact))
    }

    /// Distinct origins with the facts stored under each.
    pub fn iter_by_origin(&self) -> impl Iterator<Item = (&Origin, Vec<&Fact>)> {
        self.by_origin.iter().map(move |(origin, indexes)| {
            let facts = indexes
                .iter()
                .filter_map(|i| self.entries.get_index(*i).map(|e| &e.fact))
                .collect();
            (origin, facts)
        })
    }

    /// Facts with the name and arity of `predicate` that are readable under
    /// `trusted`, with their arena index.
    pub fn candidates<'a>(
        &'a self,
        predicate: &Predicate,
        trusted: &'a TrustedOrigins,
    ) -> impl Iterator<Item = (usize, &'a Origin, &'a Fact)> + 'a {
        self.by_shape
            .get(&(predicate.name, predicate.arity()))
            .into_iter()
            .flatten()
            .filter_map(move |index| {
                let entry = self.entries.get_index(*index)?;
                trusted
                    .contains(&entry.origin)
                    .then_some((*index, &entry.origin, &entry.fact))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    fn fact(name: u64, value: i64) -> Fact {
        Fact::new(name, vec![Term::Integer(value)])
    }

    #[test]
    fn test_same_fact_under_distinct_origins() {
        let mut facts = FactSet::new();
        assert!(facts.insert(&Origin::block(0), fact(1, 1)));
        assert!(!facts.insert(&Origin::block(0), fact(1, 1)));
        assert!(facts.insert(&Origin::block(1), fact(1, 1)));

        assert_eq!(facts.len(), 2);
        assert!(facts.contains(&Origin::block(1), &fact(1, 1)));
        assert!(!facts.contains(&Origin::block(2), &fact(1, 1)));
    }

    #[test]
    fn test_candidates_respect_shape_and_trust() {
        let mut facts = FactSet::new();
        facts.insert(&Origin::block(0), fact(1, 1));
        facts.insert(&Origin::block(1), fact(1, 2));
        facts.insert(&Origin::block(0), fact(2, 3));
        facts.insert(&Origin::block(0), Fact::new(1, vec![]));

        let trusted = TrustedOrigins::default();
        let pattern = Predicate::new(1, vec![Term::Variable(0)]);
        let found: Vec<_> = facts
            .candidates(&pattern, &trusted)
            .map(|(i, _, f)| (i, f.clone()))
            .collect();

        assert_eq!(found, vec![(0, fact(1, 1))]);
    }

    #[test]
    fn test_iter_by_origin() {
        let mut facts = FactSet::new();
        facts.insert(&Origin::block(1), fact(1, 1));
        facts.insert(&Origin::authorizer(), fact(1, 2));
        facts.insert(&Origin::block(1), fact(1, 3));

        let grouped: Vec<_> = facts
            .iter_by_origin()
            .map(|(o, f)| (o.clone(), f.len()))
            .collect();
        assert_eq!(
            grouped,
            vec![(Origin::block(1), 2), (Origin::authorizer(), 1)]
        );
    }
}
