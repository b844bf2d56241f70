//! Wall-clock budget for one process run.
//!
//! One monotonic reading is captured at startup; everything afterwards is
//! arithmetic against it. A zero timeout means the run is unbounded and the
//! clock never reports exhaustion.

use std::time::Duration;
use tokio::time::Instant;

/// Elapsed-time tracker started once per process.
///
/// Holds the runtime's instant rather than the OS clock so tests can drive
/// it deterministically with a paused timer.
#[derive(Debug, Clone, Copy)]
pub struct BudgetClock {
    started: Instant,
}

impl BudgetClock {
    /// Capture the start instant. Called once, before the first cycle.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time since the clock started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget left against `timeout_secs`. `None` when the budget is
    /// unbounded (zero timeout); `Some(ZERO)` once it is spent.
    pub fn remaining(&self, timeout_secs: u64) -> Option<Duration> {
        if timeout_secs == 0 {
            return None;
        }
        Some(Duration::from_secs(timeout_secs).saturating_sub(self.elapsed()))
    }

    /// Whether starting one more attempt would run past the budget.
    ///
    /// True when elapsed time already exceeds the timeout, or when sleeping
    /// one more `interval_secs` (if positive) would land past it. Refusing
    /// up front beats sleeping through the deadline only to fail afterwards.
    pub fn lookahead_exhausted(&self, timeout_secs: u64, interval_secs: u64) -> bool {
        if timeout_secs == 0 {
            return false;
        }
        let timeout = Duration::from_secs(timeout_secs);
        let elapsed = self.elapsed();
        if elapsed > timeout {
            return true;
        }
        interval_secs > 0 && elapsed + Duration::from_secs(interval_secs) > timeout
    }
}
