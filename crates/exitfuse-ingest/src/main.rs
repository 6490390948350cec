//! Build the relay exit policy table from local snapshots.
//!
//! Reads consensus, exit-list and descriptor snapshots from a data
//! directory and writes one JSON object per exit relay.
//!
//! # Pipeline
//!
//! ```text
//! [Consensuses] → [Baseline] → [Reconcile] → [Override] → [exit-policies]
//!                                  ↑             ↑
//!                             Exit-lists    Descriptors
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Everything under ./data (or $EXITFUSE_DATA_DIR)
//! exitfuse-ingest
//!
//! # Only the 24 most recent consensuses
//! exitfuse-ingest -n 24
//!
//! # Explicit paths, hour-level exit-list matching, metrics on :9091
//! exitfuse-ingest --data-dir /srv/check/data \
//!     --output /srv/check/data/exit-policies \
//!     --exit-list-match hour --metrics-port 9091
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use exitfuse_core::metrics::{init_metrics, start_metrics_server};
use exitfuse_ingest::{Config, MatchGranularity, RunSummary, run};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Fuse relay snapshots into an exit policy table.
#[derive(Parser, Debug)]
#[command(name = "exitfuse-ingest")]
#[command(about = "Fuse consensus, exit-list and descriptor snapshots into an exit policy table")]
struct Args {
    /// Process only the N most recent consensus snapshots
    #[arg(short = 'n', long)]
    limit: Option<NonZeroUsize>,

    /// Base directory for inputs and output (overrides EXITFUSE_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory of *-consensus snapshots
    #[arg(long)]
    consensus_dir: Option<PathBuf>,

    /// Directory of exit-list snapshots
    #[arg(long)]
    exit_list_dir: Option<PathBuf>,

    /// Descriptor file or directory
    #[arg(long)]
    descriptors: Option<PathBuf>,

    /// Output path for the exit policy table
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How exit-lists are paired with consensuses
    #[arg(long, value_enum)]
    exit_list_match: Option<MatchGranularity>,

    /// Parser threads
    #[arg(long)]
    workers: Option<NonZeroUsize>,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "0")]
    metrics_port: u16,
}

impl Args {
    /// Environment configuration with command-line overrides applied.
    fn into_config(self) -> Result<Config> {
        let mut config = Config::from_env().context("Failed to load configuration")?;

        if let Some(data_dir) = &self.data_dir {
            let derived = Config::with_data_dir(data_dir);
            config.consensus_dir = derived.consensus_dir;
            config.exit_list_dir = derived.exit_list_dir;
            config.descriptors = derived.descriptors;
            config.output = derived.output;
        }
        if let Some(dir) = self.consensus_dir {
            config.consensus_dir = dir;
        }
        if let Some(dir) = self.exit_list_dir {
            config.exit_list_dir = dir;
        }
        if let Some(path) = self.descriptors {
            config.descriptors = path;
        }
        if let Some(path) = self.output {
            config.output = path;
        }
        if let Some(granularity) = self.exit_list_match {
            config.exit_list_match = granularity;
        }
        if let Some(workers) = self.workers {
            config.workers = workers.get();
        }
        config.limit = self.limit.map(NonZeroUsize::get);

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("exitfuse_ingest=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let metrics_port = args.metrics_port;
    let config = args.into_config()?;

    // Initialize metrics and start server (if enabled)
    if metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(metrics_port, metrics_handle)
            .await
            .with_context(|| format!("Failed to start metrics server on port {metrics_port}"))?;
    }

    let start = Instant::now();
    let summary = tokio::task::spawn_blocking({
        let config = config.clone();
        move || run(&config, Utc::now())
    })
    .await
    .context("Fusion run panicked")?
    .with_context(|| format!("Failed to build {}", config.output.display()))?;

    print_summary(&config, &summary, start.elapsed());

    Ok(())
}

fn print_summary(config: &Config, summary: &RunSummary, elapsed: std::time::Duration) {
    println!("\n══════════════════════════════════════════════════════════════════");
    println!("SUMMARY");
    println!("══════════════════════════════════════════════════════════════════\n");

    println!("Consensuses: {}", config.consensus_dir.display());
    println!("Exit-lists:  {}", config.exit_list_dir.display());
    println!("Descriptors: {}", config.descriptors.display());
    println!("Output:      {}", config.output.display());
    println!();
    println!("Consensus files:       {:>10}", summary.consensus_files);
    println!("Exit-list files:       {:>10}", summary.exit_list_files);
    println!("Descriptor files:      {:>10}", summary.descriptor_files);
    println!();
    println!("Addresses reconciled:  {:>10}", summary.addresses_reconciled);
    println!("Policies overridden:   {:>10}", summary.policies_overridden);
    println!("Exit relays written:   {:>10}", summary.relays);
    println!();
    println!("Elapsed: {:.2}s", elapsed.as_secs_f64());
}
