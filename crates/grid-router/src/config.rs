//! Router configuration.

use std::time::Duration;

/// Miss handling limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Bound on a single fetch attempt.
    pub fetch_timeout: Duration,
    /// Maximum fetch attempts per miss. Each candidate is tried at most once
    /// regardless.
    pub retry_budget: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(2),
            retry_budget: 3,
        }
    }
}

impl RouterConfig {
    /// Short timeouts for tests and local simulations.
    pub fn fast() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(50),
            retry_budget: 3,
        }
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the attempt budget (at least one).
    #[must_use]
    pub fn with_retry_budget(mut self, budget: usize) -> Self {
        self.retry_budget = budget.max(1);
        self
    }
}
