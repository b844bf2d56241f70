//! Paircast: resilient one-shot publisher for ranked market-pair updates.
//!
//! This library provides:
//! - A gather phase that ranks pairs by compound volume, selects one, and
//!   composes the update text
//! - A publish phase that sends the update once and records the post with
//!   bounded retries against the same receipt
//! - An orchestrator that wraps both phases in an outer retry cycle bounded
//!   by an attempt limit and a wall-clock budget
//!
//! # Guarantees
//!
//! - The send is invoked at most once per publish phase invocation; a new
//!   send only happens when the phase itself is re-entered, either because
//!   the previous send failed (nothing posted) or because a fresh outer
//!   cycle started
//! - Recording reuses the receipt the send returned; retries never mint a
//!   second post
//! - The wall-clock budget is checked with look-ahead, so the run refuses a
//!   retry interval that would land past its deadline
//!
//! # Usage
//!
//! ```bash
//! # Publish using paircast.toml in the working directory
//! paircast
//!
//! # Compose only, skipping the live endpoint and store writes
//! paircast --dry-run
//!
//! # Point at a different config file
//! paircast --config /etc/paircast/prod.toml
//! ```

pub mod backoff;
pub mod budget;
pub mod compose;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod gather;
pub mod orchestrator;
pub mod publish;
pub mod state_machine;
pub mod store;
pub mod types;

// Re-export key pipeline types
pub use error::{GatherStage, PublishError, PublishResult};
pub use orchestrator::{Collaborators, Orchestrator, RunReport};
pub use types::{Draft, Pair, PostReceipt, PostRecord, RecordId};

// Re-export phase entry points
pub use gather::gather;
pub use publish::{publish, Published};

// Re-export budget and scheduling types
pub use backoff::Backoff;
pub use budget::BudgetClock;
pub use state_machine::{CycleMachine, CycleState, IllegalTransition, TransitionRecord};

// Re-export configuration types
pub use config::{
    CycleSettings, EndpointSettings, MessageSettings, PaircastConfig, StoreSettings,
};

// Re-export collaborator traits and implementations
pub use compose::{MessageComposer, PairSelector, TemplateComposer, TopVolumeSelector};
pub use endpoint::{HttpEndpoint, PostingEndpoint, PreviewEndpoint};
pub use store::{PairSource, PgStore, PostStore, PreviewLedger};
