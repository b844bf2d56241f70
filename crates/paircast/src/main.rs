//! Paircast CLI: publish one ranked market-pair update.
//!
//! Reads the pair ranking from Postgres, composes an update for the top
//! pair, posts it to the configured endpoint, and records the post. The
//! whole run is bounded by the retry and timeout settings in the config
//! file; the process exits non-zero if no update could be published and
//! recorded within that budget.
//!
//! # Usage
//!
//! ```bash
//! # Publish using ./paircast.toml
//! paircast
//!
//! # Compose and log the update without posting or recording
//! paircast --dry-run
//!
//! # Custom configuration
//! PAIRCAST_DB_URL=postgres://localhost/paircast paircast --config prod.toml
//! ```

// The binary only reaches part of the library surface
#![allow(dead_code)]

mod backoff;
mod budget;
mod compose;
mod config;
mod endpoint;
mod error;
mod gather;
mod orchestrator;
mod publish;
mod state_machine;
mod store;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use budget::BudgetClock;
use compose::{TemplateComposer, TopVolumeSelector};
use config::PaircastConfig;
use endpoint::{HttpEndpoint, PreviewEndpoint};
use orchestrator::{Collaborators, Orchestrator};
use store::{PgStore, PreviewLedger};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "paircast.toml")]
    config: PathBuf,

    /// Compose the update but post and record nowhere
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = PaircastConfig::load(&args.config)?;
    let run_id = Uuid::new_v4().to_string();
    info!(
        run_id = %run_id,
        config = %args.config.display(),
        dry_run = args.dry_run,
        "paircast starting"
    );

    if !args.dry_run && config.endpoint.url.is_empty() {
        bail!("no posting endpoint configured; set [endpoint] url or pass --dry-run");
    }

    // The run budget covers everything, connection setup included.
    let clock = BudgetClock::start();

    let store = Arc::new(PgStore::connect(&config.store, &run_id).await?);
    let selector = Arc::new(TopVolumeSelector);
    let composer = Arc::new(TemplateComposer::new(&config.message));

    let collaborators = if args.dry_run {
        Collaborators {
            source: store,
            selector,
            composer,
            endpoint: Arc::new(PreviewEndpoint),
            store: Arc::new(PreviewLedger),
        }
    } else {
        Collaborators {
            source: store.clone(),
            selector,
            composer,
            endpoint: Arc::new(HttpEndpoint::new(&config.endpoint)?),
            store,
        }
    };

    let mut orchestrator = Orchestrator::new(config.cycle, clock, collaborators);
    match orchestrator.run().await {
        Ok(report) => {
            info!(
                pair = %report.pair,
                receipt = %report.receipt,
                record_id = %report.record_id,
                cycles = report.cycles,
                elapsed_secs = report.elapsed.as_secs(),
                "publish run complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "publish run failed");
            Err(e)
        }
    }
}
