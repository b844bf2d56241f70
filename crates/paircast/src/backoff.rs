//! Fixed-interval retry scheduling.
//!
//! The scheduler owns no counter: each caller tracks its own attempt number
//! and asks two questions, whether the next attempt may run and how long to
//! pause first. A zero limit means unbounded attempts. That is deliberately
//! different from "no attempts" (the limit counts permitted attempts, so 1
//! means a single try), and tests pin the distinction down.

use std::time::Duration;
use tracing::debug;

/// Retry policy for one level of the publish cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    limit: u32,
    interval: Duration,
}

impl Backoff {
    pub fn new(limit: u32, interval_secs: u64) -> Self {
        Self {
            limit,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Whether `attempt` (1-based) may run. A zero limit allows everything.
    pub fn allows(&self, attempt: u32) -> bool {
        self.limit == 0 || attempt <= self.limit
    }

    /// Attempt limit, zero meaning unbounded.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Sleep the configured interval. A zero interval returns immediately
    /// without touching the timer.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        debug!(
            interval_secs = self.interval.as_secs(),
            "backing off before next attempt"
        );
        tokio::time::sleep(self.interval).await;
    }
}
