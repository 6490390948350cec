//! Print the relays that can exit to a target address and port.
//!
//! ```bash
//! bulk-exit-list --ip 203.0.113.7 --port 443
//! bulk-exit-list --policies ./data/exit-policies --ip 2001:db8::1 --port 80
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use exitfuse_core::{Bucket, DEFAULT_TARGET_ADDRESS, DEFAULT_TARGET_PORT};
use exitfuse_ingest::{Config, DEFAULT_MAX_AGE_HOURS, ExitIndex};
use std::io::{self, BufWriter};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// List exit relays able to reach a target.
#[derive(Parser, Debug)]
#[command(name = "bulk-exit-list")]
#[command(about = "List relay addresses whose exit policy allows a target address and port")]
struct Args {
    /// Exit policy table (default: $EXITFUSE_DATA_DIR/exit-policies)
    #[arg(long)]
    policies: Option<PathBuf>,

    /// Target address
    #[arg(long, default_value = DEFAULT_TARGET_ADDRESS)]
    ip: IpAddr,

    /// Target port
    #[arg(long, default_value_t = DEFAULT_TARGET_PORT)]
    port: u16,

    /// Ignore relays whose consensus is older than this many hours
    #[arg(long, default_value_t = DEFAULT_MAX_AGE_HOURS)]
    max_age_hours: Bucket,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the list
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let args = Args::parse();

    let policies = match args.policies {
        Some(path) => path,
        None => Config::from_env().context("Failed to load configuration")?.output,
    };

    let index = ExitIndex::load_from_path(&policies)
        .with_context(|| format!("Failed to load exit policies from {}", policies.display()))?;

    let stdout = io::stdout();
    index
        .write_bulk_list(BufWriter::new(stdout.lock()), args.ip, args.port, args.max_age_hours)
        .context("Failed to write exit list")?;

    Ok(())
}
