//! Publish cycle state machine: explicit states and legal transition guards.
//!
//! The orchestrator loop never flips ad-hoc booleans; it asks the machine to
//! `advance()` and the machine validates the edge against the cycle graph,
//! logs it, and records it. That keeps the outer/inner retry interaction
//! auditable and lets a failed run print exactly how it got there.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// The set of publish cycle states.
///
/// Every run starts at `Gathering` and terminates at either `Published` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Running the gather phase: rank, select, compose.
    Gathering,
    /// Sending the composed update and recording the post.
    Publishing,
    /// Sleeping out the interval before another outer cycle.
    WaitingRetry,
    /// Update sent and durably recorded. Terminal.
    Published,
    /// Budget exhausted with nothing recorded. Terminal.
    Failed,
}

impl CycleState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gathering => write!(f, "Gathering"),
            Self::Publishing => write!(f, "Publishing"),
            Self::WaitingRetry => write!(f, "WaitingRetry"),
            Self::Published => write!(f, "Published"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal transitions between cycle states.
///
/// The transition table encodes the valid edges in the cycle graph:
/// ```text
/// Gathering → Publishing | WaitingRetry | Failed
/// Publishing → Published | WaitingRetry | Failed
/// WaitingRetry → Gathering | Failed
/// ```
fn is_legal_transition(from: CycleState, to: CycleState) -> bool {
    use CycleState::*;

    // Any non-terminal state can transition to Failed.
    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Gathering, Publishing)
            // Gather failed but budget allows another cycle
            | (Gathering, WaitingRetry)
            | (Publishing, Published)
            // Publish exhausted its inner budget, fall back to the outer cycle
            | (Publishing, WaitingRetry)
            // Interval slept and the outer limit still permits a fresh gather
            | (WaitingRetry, Gathering)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state transitioned from.
    pub from: CycleState,
    /// The state transitioned to.
    pub to: CycleState,
    /// Outer cycle number at the time of transition.
    pub cycle: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: CycleState,
    pub to: CycleState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// The publish cycle state machine.
///
/// Tracks the current state, enforces legal transitions, and keeps a
/// complete log of all transitions for diagnostics.
pub struct CycleMachine {
    current: CycleState,
    cycle: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl CycleMachine {
    /// Create a new state machine starting at `Gathering`, cycle 1.
    pub fn new() -> Self {
        Self {
            current: CycleState::Gathering,
            cycle: 1,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    /// Get the current state.
    pub fn current(&self) -> CycleState {
        self.current
    }

    /// Get the current outer cycle number.
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Set the outer cycle number (called by the orchestrator loop).
    pub fn set_cycle(&mut self, cycle: u32) {
        self.cycle = cycle;
    }

    /// Attempt to advance to the next state.
    ///
    /// Returns `Ok(())` if the transition is legal, or `Err(IllegalTransition)`
    /// if it would violate the cycle graph.
    pub fn advance(&mut self, to: CycleState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            cycle: self.cycle,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            cycle = self.cycle,
            "State transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed` from any non-terminal state.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(CycleState::Failed, Some(reason))
    }

    /// Whether the state machine is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Get the full transition log.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Get a summary string of the state machine's history.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} → {} ({}ms, {} transitions)",
            CycleState::Gathering,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !self.transitions.is_empty() {
            let path: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
            line.push_str(&format!(" [{}]", path.join(" → ")));
        }
        line
    }
}

impl Default for CycleMachine {
    fn default() -> Self {
        Self::new()
    }
}
