//! String interning and the public key table.
//!
//! Every string that appears in a fact, rule or expression is stored once in
//! a [`SymbolTable`] and referred to by its [`SymbolIndex`]. Ids below
//! [`OFFSET`] name the built-in symbols shared by every table; ids at or above
//! it index the table's own strings.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::check::{Check, CheckKind};
use crate::error::{Error, Result};
use crate::origin::Scope;
use crate::rule::Rule;
use crate::term::{Fact, Predicate, Term};

/// Index of an interned string.
pub type SymbolIndex = u64;

/// First id available to table-local strings.
pub const OFFSET: usize = 1024;

/// Built-in symbols, available to every table without being stored in it.
pub const DEFAULT_SYMBOLS: [&str; 30] = [
    "authority",
    "ambient",
    "read",
    "write",
    "resource",
    "operation",
    "right",
    "time",
    "role",
    "owner",
    "tenant",
    "namespace",
    "user",
    "team",
    "service",
    "admin",
    "email",
    "group",
    "member",
    "ip_address",
    "client",
    "client_ip",
    "domain",
    "path",
    "version",
    "cluster",
    "node",
    "hostname",
    "nonce",
    "query",
];

/// The session-wide string interning table.
///
/// Insertion is idempotent. A table also carries the [`PublicKeys`] referenced
/// by `trusting` scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<String>,
    public_keys: PublicKeys,
}

impl SymbolTable {
    /// Creates an empty table (built-in symbols only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from a block-local symbol fragment.
    ///
    /// The fragment must not repeat any built-in symbol, since those never
    /// occupy local ids.
    pub fn from_symbols(symbols: Vec<String>) -> Result<Self> {
        if let Some(s) = symbols.iter().find(|s| DEFAULT_SYMBOLS.contains(&s.as_str())) {
            return Err(Error::DefaultSymbolRedefined(s.clone()));
        }
        Ok(Self {
            symbols,
            public_keys: PublicKeys::default(),
        })
    }

    /// Interns `s`, returning the existing id if it is already present.
    pub fn insert(&mut self, s: &str) -> SymbolIndex {
        if let Some(index) = self.get(s) {
            return index;
        }
        self.symbols.push(s.to_string());
        (OFFSET + self.symbols.len() - 1) as SymbolIndex
    }

    /// Looks up the id of `s` without inserting it.
    pub fn get(&self, s: &str) -> Option<SymbolIndex> {
        if let Some(index) = DEFAULT_SYMBOLS.iter().position(|sym| *sym == s) {
            return Some(index as SymbolIndex);
        }
        self.symbols
            .iter()
            .position(|sym| sym == s)
            .map(|index| (OFFSET + index) as SymbolIndex)
    }

    /// Resolves an id to its string.
    pub fn get_symbol(&self, index: SymbolIndex) -> Option<&str> {
        let index = usize::try_from(index).ok()?;
        if index < OFFSET {
            DEFAULT_SYMBOLS.get(index).copied()
        } else {
            self.symbols.get(index - OFFSET).map(String::as_str)
        }
    }

    /// Number of table-local strings (built-ins excluded).
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` if the table holds no local strings.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The public keys referenced by this table's scopes.
    pub fn public_keys(&self) -> &PublicKeys {
        &self.public_keys
    }

    /// Mutable access to the public key table.
    pub fn public_keys_mut(&mut self) -> &mut PublicKeys {
        &mut self.public_keys
    }

    /// Resolves an id, failing with [`Error::UnknownSymbol`].
    pub fn print_symbol(&self, index: SymbolIndex) -> Result<String> {
        self.get_symbol(index)
            .map(str::to_string)
            .ok_or(Error::UnknownSymbol(index))
    }

    /// Resolves an id, rendering unknown ids as `<id?>`.
    pub fn print_symbol_default(&self, index: SymbolIndex) -> String {
        self.get_symbol(index)
            .map(str::to_string)
            .unwrap_or_else(|| format!("<{}?>", index))
    }

    pub fn print_term(&self, term: &Term) -> String {
        match term {
            Term::Variable(i) => format!("${}", self.print_symbol_default(u64::from(*i))),
            Term::Integer(i) => i.to_string(),
            Term::Str(index) => format!("{:?}", self.print_symbol_default(*index)),
            Term::Date(d) => print_date(*d),
            Term::Bytes(b) => format!("hex:{}", hex::encode(b)),
            Term::Bool(b) => b.to_string(),
            Term::Set(s) => {
                let terms = s.iter().map(|t| self.print_term(t)).collect::<Vec<_>>();
                format!("[{}]", terms.join(", "))
            }
        }
    }

    pub fn print_predicate(&self, predicate: &Predicate) -> String {
        let terms = predicate
            .terms
            .iter()
            .map(|t| self.print_term(t))
            .collect::<Vec<_>>();
        format!(
            "{}({})",
            self.print_symbol_default(predicate.name),
            terms.join(", ")
        )
    }

    pub fn print_fact(&self, fact: &Fact) -> String {
        self.print_predicate(&fact.predicate)
    }

    /// Renders a rule body: predicates, then expressions, then scopes.
    pub fn print_rule_body(&self, rule: &Rule) -> String {
        let mut parts = rule
            .body
            .iter()
            .map(|p| self.print_predicate(p))
            .collect::<Vec<_>>();
        parts.extend(
            rule.expressions
                .iter()
                .map(|e| e.print(self).unwrap_or_else(|| "<invalid expression>".to_string())),
        );

        if parts.is_empty() {
            parts.push("true".to_string());
        }

        let mut out = parts.join(", ");
        if !rule.scopes.is_empty() {
            let scopes = rule
                .scopes
                .iter()
                .map(|s| self.print_scope(s))
                .collect::<Vec<_>>();
            out.push_str(" trusting ");
            out.push_str(&scopes.join(", "));
        }
        out
    }

    pub fn print_rule(&self, rule: &Rule) -> String {
        format!(
            "{} <- {}",
            self.print_predicate(&rule.head),
            self.print_rule_body(rule)
        )
    }

    pub fn print_check(&self, check: &Check) -> String {
        let prefix = match check.kind {
            CheckKind::One => "check if",
            CheckKind::All => "check all",
            CheckKind::Reject => "reject if",
        };
        let queries = check
            .queries
            .iter()
            .map(|q| self.print_rule_body(q))
            .collect::<Vec<_>>();
        format!("{} {}", prefix, queries.join(" or "))
    }

    pub fn print_scope(&self, scope: &Scope) -> String {
        match scope {
            Scope::Authority => "authority".to_string(),
            Scope::Previous => "previous".to_string(),
            Scope::PublicKey(id) => match self.public_keys.get_key(*id) {
                Some(key) => key.to_string(),
                None => format!("<{}?>", id),
            },
        }
    }
}

/// Renders seconds since the epoch as an RFC 3339 UTC timestamp.
pub(crate) fn print_date(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| seconds.to_string())
}

/// A scratch interning layer over a borrowed [`SymbolTable`].
///
/// Strings created while evaluating expressions (concatenation) are interned
/// here, above `OFFSET + base.len()`, so the session table is never mutated
/// during evaluation.
#[derive(Debug)]
pub struct TemporarySymbolTable<'a> {
    base: &'a SymbolTable,
    offset: SymbolIndex,
    symbols: Vec<String>,
}

impl<'a> TemporarySymbolTable<'a> {
    pub fn new(base: &'a SymbolTable) -> Self {
        Self {
            base,
            offset: (OFFSET + base.len()) as SymbolIndex,
            symbols: Vec::new(),
        }
    }

    pub fn get_symbol(&self, index: SymbolIndex) -> Option<&str> {
        if index >= self.offset {
            let local = usize::try_from(index - self.offset).ok()?;
            self.symbols.get(local).map(String::as_str)
        } else {
            self.base.get_symbol(index)
        }
    }

    pub fn insert(&mut self, s: &str) -> SymbolIndex {
        if let Some(index) = self.base.get(s) {
            return index;
        }
        match self.symbols.iter().position(|sym| sym == s) {
            Some(index) => self.offset + index as SymbolIndex,
            None => {
                self.symbols.push(s.to_string());
                self.offset + (self.symbols.len() - 1) as SymbolIndex
            }
        }
    }
}

/// Signature algorithm of a [`PublicKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    Ed25519,
    Secp256r1,
}

/// An opaque public key, as handed over by the signature layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey {
    algorithm: Algorithm,
    bytes: Vec<u8>,
}

impl PublicKey {
    pub fn new(algorithm: Algorithm, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm,
            bytes: bytes.into(),
        }
    }

    pub fn ed25519(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Algorithm::Ed25519, bytes)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithm = match self.algorithm {
            Algorithm::Ed25519 => "ed25519",
            Algorithm::Secp256r1 => "secp256r1",
        };
        write!(f, "{}/{}", algorithm, hex::encode(&self.bytes))
    }
}

/// Interning table for public keys; insertion is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeys {
    keys: Vec<PublicKey>,
}

impl PublicKeys {
    pub fn insert(&mut self, key: &PublicKey) -> u64 {
        match self.get(key) {
            Some(index) => index,
            None => {
                self.keys.push(key.clone());
                (self.keys.len() - 1) as u64
            }
        }
    }

    pub fn get(&self, key: &PublicKey) -> Option<u64> {
        self.keys.iter().position(|k| k == key).map(|i| i as u64)
    }

    pub fn get_key(&self, index: u64) -> Option<&PublicKey> {
        self.keys.get(usize::try_from(index).ok()?)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.keys.iter()
    }
}
