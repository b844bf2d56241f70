//! Value types moving through the publish pipeline.
//!
//! Everything here is plain data: produced by one phase, handed to the next,
//! dropped when the cycle that produced it ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One market pair as returned by the ranking source, highest volume first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    /// Canonical symbol, e.g. "BTC/USDT".
    pub symbol: String,
    /// Volume aggregated across every venue the pair trades on.
    pub compound_volume: f64,
    /// Venues contributing to the compound volume, largest share first.
    pub venues: Vec<String>,
}

impl Pair {
    pub fn new(symbol: &str, compound_volume: f64, venues: &[&str]) -> Self {
        Self {
            symbol: symbol.to_string(),
            compound_volume,
            venues: venues.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// A composed update ready to post: the chosen pair plus the rendered text.
///
/// Owned by exactly one publish cycle; the next cycle gathers a fresh one.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub pair: Pair,
    pub text: String,
}

impl Draft {
    pub fn new(pair: Pair, text: impl Into<String>) -> Self {
        Self {
            pair,
            text: text.into(),
        }
    }
}

/// Identifier handed back by the posting endpoint for a published update.
///
/// The endpoint call is not idempotent, so a receipt is minted at most once
/// per cycle and reused verbatim for every recording attempt; a new receipt
/// only ever comes from a fresh send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt(pub String);

impl std::fmt::Display for PostReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the persisted post row. Its existence is the sole signal
/// that a run succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row payload persisted for a published update.
///
/// Built once, immediately after the send succeeds, and resubmitted unchanged
/// on every recording retry. `posted_at` is the send time, not the insert
/// time, since recording can lag the post by several retry intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub pair: String,
    pub receipt: PostReceipt,
    pub body: String,
    pub posted_at: DateTime<Utc>,
}

impl PostRecord {
    pub fn new(draft: &Draft, receipt: PostReceipt) -> Self {
        Self {
            pair: draft.pair.symbol.clone(),
            receipt,
            body: draft.text.clone(),
            posted_at: Utc::now(),
        }
    }
}
