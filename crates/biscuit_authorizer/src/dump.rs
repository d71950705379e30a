//! Snapshot of an authorizer's world, for debugging and logging.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Facts sharing one origin, rendered as Datalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginFacts {
    pub origin: String,
    pub facts: Vec<String>,
}

/// Rules declared by one block, or by the authorizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRules {
    pub origin: String,
    pub rules: Vec<String>,
}

/// Checks declared by one block, or by the authorizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChecks {
    pub origin: String,
    pub checks: Vec<String>,
}

/// Everything an authorizer evaluates, rendered as Datalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerDump {
    pub facts: Vec<OriginFacts>,
    pub rules: Vec<OriginRules>,
    pub checks: Vec<BlockChecks>,
    pub policies: Vec<String>,
    /// Passes performed by the last fixpoint run.
    pub iterations: u64,
}

impl AuthorizerDump {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for AuthorizerDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "World {{")?;

        writeln!(f, "  facts: [")?;
        for group in &self.facts {
            writeln!(f, "    // origin: {}", group.origin)?;
            for fact in &group.facts {
                writeln!(f, "    {};", fact)?;
            }
        }
        writeln!(f, "  ]")?;

        writeln!(f, "  rules: [")?;
        for group in &self.rules {
            writeln!(f, "    // origin: {}", group.origin)?;
            for rule in &group.rules {
                writeln!(f, "    {};", rule)?;
            }
        }
        writeln!(f, "  ]")?;

        writeln!(f, "  checks: [")?;
        for group in self.checks.iter().filter(|g| !g.checks.is_empty()) {
            writeln!(f, "    // origin: {}", group.origin)?;
            for check in &group.checks {
                writeln!(f, "    {};", check)?;
            }
        }
        writeln!(f, "  ]")?;

        writeln!(f, "  policies: [")?;
        for policy in &self.policies {
            writeln!(f, "    {};", policy)?;
        }
        writeln!(f, "  ]")?;

        write!(f, "}}")
    }
}
