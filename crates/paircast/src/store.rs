//! Postgres bridge: ranked pair reads and post record writes.
//!
//! Expected schema:
//!
//! ```text
//! CREATE TABLE pairs (
//!     symbol          TEXT PRIMARY KEY,
//!     compound_volume DOUBLE PRECISION NOT NULL,
//!     venues          TEXT[] NOT NULL DEFAULT '{}'
//! );
//!
//! CREATE TABLE posts (
//!     id        BIGSERIAL PRIMARY KEY,
//!     pair      TEXT NOT NULL,
//!     receipt   TEXT NOT NULL UNIQUE,
//!     body      TEXT NOT NULL,
//!     run_id    TEXT NOT NULL,
//!     posted_at TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! The receipt column is unique so recording the same receipt twice upserts
//! into one row. That is what makes record retries safe: an insert whose
//! acknowledgement was lost resolves to the same record on the next attempt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::{debug, error, info};

use crate::config::StoreSettings;
use crate::types::{Pair, PostRecord, RecordId};

/// Ranked pair feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairSource: Send + Sync {
    /// The top pairs by compound volume, best first. An empty list is a
    /// legitimate answer (nothing to publish right now).
    async fn fetch_top_pairs(&self) -> Result<Vec<Pair>>;
}

/// Durable post ledger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist one post record. Safe to call repeatedly with the same
    /// record; duplicate receipts resolve to the same row.
    async fn record(&self, record: &PostRecord) -> Result<RecordId>;
}

/// Postgres-backed source and ledger.
pub struct PgStore {
    client: tokio_postgres::Client,
    top_limit: i64,
    run_id: String,
}

impl PgStore {
    /// Connect within the configured timeout and spawn the connection
    /// driver. The driver task only shuttles socket I/O; it ends when the
    /// client drops.
    pub async fn connect(settings: &StoreSettings, run_id: &str) -> Result<Self> {
        let (client, connection) = tokio::time::timeout(
            Duration::from_secs(settings.connect_timeout),
            tokio_postgres::connect(&settings.url, NoTls),
        )
        .await
        .context("Store connection attempt timed out")?
        .context("Failed to connect to the document store")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "store connection closed with error");
            }
        });

        info!(run_id, "connected to the document store");
        Ok(Self {
            client,
            top_limit: i64::from(settings.top_limit),
            run_id: run_id.to_string(),
        })
    }
}

#[async_trait]
impl PairSource for PgStore {
    async fn fetch_top_pairs(&self) -> Result<Vec<Pair>> {
        let rows = self
            .client
            .query(
                "SELECT symbol, compound_volume, venues \
                 FROM pairs ORDER BY compound_volume DESC LIMIT $1",
                &[&self.top_limit],
            )
            .await
            .context("Ranking query failed")?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            pairs.push(Pair {
                symbol: row.try_get("symbol").context("pairs.symbol missing")?,
                compound_volume: row
                    .try_get("compound_volume")
                    .context("pairs.compound_volume missing")?,
                venues: row.try_get("venues").context("pairs.venues missing")?,
            });
        }
        debug!(count = pairs.len(), "fetched ranked pairs");
        Ok(pairs)
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn record(&self, record: &PostRecord) -> Result<RecordId> {
        let row = self
            .client
            .query_one(
                "INSERT INTO posts (pair, receipt, body, run_id, posted_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (receipt) DO UPDATE SET body = EXCLUDED.body \
                 RETURNING id::text",
                &[
                    &record.pair,
                    &record.receipt.0,
                    &record.body,
                    &self.run_id,
                    &record.posted_at,
                ],
            )
            .await
            .context("Post insert failed")?;

        let id: String = row.try_get(0).context("Post insert returned no id")?;
        Ok(RecordId(id))
    }
}

/// Dry-run ledger: logs the record instead of writing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewLedger;

#[async_trait]
impl PostStore for PreviewLedger {
    async fn record(&self, record: &PostRecord) -> Result<RecordId> {
        info!(
            pair = %record.pair,
            receipt = %record.receipt,
            "dry run: would record post"
        );
        Ok(RecordId(format!("preview-{}", record.receipt)))
    }
}
