//! Provenance tags and rule visibility.
//!
//! Every stored fact carries an [`Origin`]: the set of blocks whose content
//! justifies it. A rule reads only facts whose origin is contained in its
//! [`TrustedOrigins`], which are derived from [`Scope`] annotations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Block index reserved for content asserted by the authorizer itself.
pub const AUTHORIZER_BLOCK: usize = usize::MAX;

/// The set of blocks a fact depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Origin {
    inner: BTreeSet<usize>,
}

impl Origin {
    /// Origin of a fact asserted by block `id`.
    pub fn block(id: usize) -> Self {
        Self {
            inner: BTreeSet::from([id]),
        }
    }

    /// Origin of a fact asserted by the authorizer.
    pub fn authorizer() -> Self {
        Self::block(AUTHORIZER_BLOCK)
    }

    pub fn insert(&mut self, id: usize) {
        self.inner.insert(id);
    }

    /// Returns a new origin holding the blocks of both.
    pub fn union(&self, other: &Origin) -> Origin {
        Origin {
            inner: self.inner.union(&other.inner).copied().collect(),
        }
    }

    pub fn contains(&self, id: usize) -> bool {
        self.inner.contains(&id)
    }

    pub fn is_subset(&self, other: &Origin) -> bool {
        self.inner.is_subset(&other.inner)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.inner.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FromIterator<usize> for Origin {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl Extend<usize> for Origin {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        self.inner.extend(iter)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .inner
            .iter()
            .map(|id| match *id {
                AUTHORIZER_BLOCK => "authorizer".to_string(),
                id => id.to_string(),
            })
            .collect::<Vec<_>>();
        write!(f, "{}", parts.join(", "))
    }
}

/// Trust annotation on a block or rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// The authority (first) block.
    Authority,
    /// Every block up to and including the current one.
    Previous,
    /// Every block signed by the key at this index of the public key table.
    PublicKey(u64),
}

/// The origins a rule is allowed to read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrustedOrigins(Origin);

impl Default for TrustedOrigins {
    /// The authority block and the authorizer.
    fn default() -> Self {
        TrustedOrigins([0, AUTHORIZER_BLOCK].into_iter().collect())
    }
}

impl TrustedOrigins {
    /// Derives the trusted origins of code living in `current_block`.
    ///
    /// Without scopes the code inherits `default_origins`. The current block
    /// and the authorizer are always trusted. `public_key_to_block_id` maps a
    /// public key table index to the blocks signed by that key.
    pub fn from_scopes(
        scopes: &[Scope],
        default_origins: &TrustedOrigins,
        current_block: usize,
        public_key_to_block_id: &HashMap<usize, Vec<usize>>,
    ) -> TrustedOrigins {
        if scopes.is_empty() {
            let mut origins = default_origins.0.clone();
            origins.insert(current_block);
            origins.insert(AUTHORIZER_BLOCK);
            return TrustedOrigins(origins);
        }

        let mut origins = Origin::block(AUTHORIZER_BLOCK);
        origins.insert(current_block);

        for scope in scopes {
            match scope {
                Scope::Authority => origins.insert(0),
                Scope::Previous => {
                    if current_block != AUTHORIZER_BLOCK {
                        origins.extend(0..=current_block)
                    }
                }
                Scope::PublicKey(key_id) => {
                    let blocks = usize::try_from(*key_id)
                        .ok()
                        .and_then(|id| public_key_to_block_id.get(&id));
                    if let Some(blocks) = blocks {
                        origins.extend(blocks.iter().copied())
                    }
                }
            }
        }

        TrustedOrigins(origins)
    }

    /// Returns `true` if every block of `origin` is trusted.
    pub fn contains(&self, origin: &Origin) -> bool {
        origin.is_subset(&self.0)
    }

    pub fn origins(&self) -> &Origin {
        &self.0
    }
}

impl From<Origin> for TrustedOrigins {
    fn from(origin: Origin) -> Self {
        TrustedOrigins(origin)
    }
}
