//! Resource limits for an evaluation.
//!
//! Every fixpoint run and every query join is bounded. The defaults are
//! tight because an authorization sits on the request path of whatever
//! service embeds it.
//!
//! # Examples
//!
//! ```
//! # use biscuit_datalog::RunLimits;
//! # use std::time::Duration;
//! let limits = RunLimits::default()
//!     .with_max_facts(5_000)
//!     .with_max_time(Duration::from_millis(20));
//! assert_eq!(limits.max_iterations, 100);
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Overrides [`RunLimits::max_facts`].
pub const ENV_MAX_FACTS: &str = "BISCUIT_MAX_FACTS";
/// Overrides [`RunLimits::max_iterations`].
pub const ENV_MAX_ITERATIONS: &str = "BISCUIT_MAX_ITERATIONS";
/// Overrides [`RunLimits::max_time`], in milliseconds.
pub const ENV_MAX_TIME_MS: &str = "BISCUIT_MAX_TIME_MS";

/// Bounds on a World run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Maximum number of stored `(origin, fact)` entries.
    pub max_facts: u64,
    /// Maximum number of fixpoint passes.
    pub max_iterations: u64,
    /// Wall-clock budget, measured from the start of the authorization.
    pub max_time: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_facts: 1000,
            max_iterations: 100,
            max_time: Duration::from_millis(5),
        }
    }
}

impl RunLimits {
    /// Creates `RunLimits` from the defaults and environment overrides.
    ///
    /// Reads the following environment variables:
    /// - `BISCUIT_MAX_FACTS` - Maximum number of facts
    /// - `BISCUIT_MAX_ITERATIONS` - Maximum number of fixpoint passes
    /// - `BISCUIT_MAX_TIME_MS` - Time budget in milliseconds
    ///
    /// Values that do not parse are ignored.
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Some(max_facts) = parse_env::<u64>(ENV_MAX_FACTS) {
            limits.max_facts = max_facts;
        }

        if let Some(max_iterations) = parse_env::<u64>(ENV_MAX_ITERATIONS) {
            limits.max_iterations = max_iterations;
        }

        if let Some(ms) = parse_env::<u64>(ENV_MAX_TIME_MS) {
            limits.max_time = Duration::from_millis(ms);
        }

        limits
    }

    pub fn with_max_facts(mut self, max_facts: u64) -> Self {
        self.max_facts = max_facts;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    /// Instant at which a run started at `start` times out, or `None` when
    /// the budget reaches past what `Instant` can represent.
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        start.checked_add(self.max_time)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let limits = RunLimits::default();
        assert_eq!(limits.max_facts, 1000);
        assert_eq!(limits.max_iterations, 100);
        assert_eq!(limits.max_time, Duration::from_millis(5));
    }

    #[test]
    fn test_builder_setters() {
        let limits = RunLimits::default()
            .with_max_facts(10)
            .with_max_iterations(2)
            .with_max_time(Duration::from_secs(1));
        assert_eq!(limits.max_facts, 10);
        assert_eq!(limits.max_iterations, 2);
        assert_eq!(limits.max_time, Duration::from_secs(1));
    }

    fn clear_env() {
        for name in [ENV_MAX_FACTS, ENV_MAX_ITERATIONS, ENV_MAX_TIME_MS] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_without_overrides() {
        clear_env();
        assert_eq!(RunLimits::from_env(), RunLimits::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var(ENV_MAX_FACTS, "5000");
        std::env::set_var(ENV_MAX_ITERATIONS, " 12 ");
        std::env::set_var(ENV_MAX_TIME_MS, "250");

        let limits = RunLimits::from_env();
        clear_env();

        assert_eq!(limits.max_facts, 5000);
        assert_eq!(limits.max_iterations, 12);
        assert_eq!(limits.max_time, Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_unparsable_values() {
        clear_env();
        std::env::set_var(ENV_MAX_FACTS, "lots");
        std::env::set_var(ENV_MAX_ITERATIONS, "-3");
        std::env::set_var(ENV_MAX_TIME_MS, "250");

        let limits = RunLimits::from_env();
        clear_env();

        assert_eq!(limits.max_facts, 1000);
        assert_eq!(limits.max_iterations, 100);
        assert_eq!(limits.max_time, Duration::from_millis(250));
    }

    #[test]
    fn test_deadline_saturates() {
        let start = Instant::now();
        let limits = RunLimits::default();
        assert_eq!(limits.deadline_from(start), Some(start + Duration::from_millis(5)));
        assert_eq!(limits.with_max_time(Duration::MAX).deadline_from(start), None);
    }

    #[test]
    fn test_serialization() {
        let limits = RunLimits::default().with_max_facts(42);
        let json = serde_json::to_string(&limits).unwrap();
        let back: RunLimits = serde_json::from_str(&json).unwrap();
        assert_eq!(back, limits);
    }
}
