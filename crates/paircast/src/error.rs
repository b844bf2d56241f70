//! Publish pipeline error types.
//!
//! Every phase reports failure as a [`PublishError`] value; nothing unwinds
//! across a phase boundary. The orchestrator is the only place that decides
//! whether a failure is worth another cycle, so the variants carry what that
//! decision and the operator both need: which stage, which pair, and the
//! collaborator's own diagnostic.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Which gather step came up empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherStage {
    /// Fetching the ranked pair set.
    Ranking,
    /// Picking one pair out of the set.
    Selection,
    /// Rendering the message text.
    Composition,
}

impl std::fmt::Display for GatherStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ranking => write!(f, "ranking"),
            Self::Selection => write!(f, "selection"),
            Self::Composition => write!(f, "composition"),
        }
    }
}

/// Failures the publish pipeline can report.
#[derive(Error, Debug)]
pub enum PublishError {
    /// A gather collaborator returned nothing, or errored. All three gather
    /// steps fail with this kind; `stage` and `detail` tell them apart.
    #[error("{stage} produced no result: {detail}")]
    EmptyResult { stage: GatherStage, detail: String },

    /// The posting endpoint rejected or errored on the send. Nothing was
    /// posted, so no recording happens for this invocation.
    #[error("send failed for {pair}: {detail}")]
    SendFailure { pair: String, detail: String },

    /// The document store would not accept the post record within the inner
    /// retry budget. The post itself went out and its receipt is named here.
    #[error("record failed for {pair} (receipt {receipt}): {detail}")]
    RecordFailure {
        pair: String,
        receipt: String,
        detail: String,
    },

    /// No further outer attempts are permitted by the time or count limits.
    /// The only terminal kind.
    #[error("publish budget exhausted after {attempts} outer attempt(s) in {elapsed_secs}s: {detail}")]
    BudgetExhausted {
        attempts: u32,
        elapsed_secs: u64,
        detail: String,
    },
}

impl PublishError {
    /// Create an empty-result error for a gather step.
    pub fn empty(stage: GatherStage, detail: impl Into<String>) -> Self {
        Self::EmptyResult {
            stage,
            detail: detail.into(),
        }
    }

    /// Create a send failure.
    pub fn send(pair: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SendFailure {
            pair: pair.into(),
            detail: detail.into(),
        }
    }

    /// Create a record failure.
    pub fn record(
        pair: impl Into<String>,
        receipt: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::RecordFailure {
            pair: pair.into(),
            receipt: receipt.into(),
            detail: detail.into(),
        }
    }

    /// Create a budget exhaustion error.
    pub fn exhausted(attempts: u32, elapsed: Duration, detail: impl Into<String>) -> Self {
        Self::BudgetExhausted {
            attempts,
            elapsed_secs: elapsed.as_secs(),
            detail: detail.into(),
        }
    }

    /// Whether a new outer cycle may still recover from this failure.
    /// Everything short of budget exhaustion is recoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::BudgetExhausted { .. })
    }
}
