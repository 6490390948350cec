//! One complete fusion run: discover, load, fuse, emit.

use crate::config::Config;
use crate::pipeline::{
    RecordSet, apply_descriptors, emit_to_path, ingest_snapshot, reconcile_bucket,
    select_exit_list,
};
use crate::snapshot::{
    discover_consensuses, discover_descriptor_files, discover_exit_lists, load_all,
};
use crate::source::{ConsensusParser, DescriptorParser, ExitListParser};
use crate::Result;
use chrono::{DateTime, Utc};
use exitfuse_core::metrics::{increment, set_gauge};
use std::collections::HashMap;
use std::path::PathBuf;

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Consensus snapshots that were loaded and ingested.
    pub consensus_files: usize,

    /// Exit-list snapshots paired with a consensus and loaded.
    pub exit_list_files: usize,

    /// Descriptor files loaded.
    pub descriptor_files: usize,

    /// Addresses replaced from exit-lists.
    pub addresses_reconciled: usize,

    /// Rule lists replaced from descriptors.
    pub policies_overridden: usize,

    /// Records written to the output table.
    pub relays: usize,
}

/// Run the whole pipeline with buckets relative to `now`.
pub fn run(config: &Config, now: DateTime<Utc>) -> Result<RunSummary> {
    set_gauge("exitfuse_run_running", 1.0);
    let result = run_inner(config, now);
    set_gauge("exitfuse_run_running", 0.0);
    result
}

fn run_inner(config: &Config, now: DateTime<Utc>) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    let mut records = RecordSet::new();

    let consensuses = discover_consensuses(&config.consensus_dir, now, config.limit)?;
    let exit_lists = discover_exit_lists(&config.exit_list_dir)?;
    tracing::info!(
        consensuses = consensuses.len(),
        exit_lists = exit_lists.len(),
        "Discovered snapshots"
    );

    // Pair every consensus with its exit-list up front so each exit-list
    // is parsed once even when several consensuses share it.
    let pairing: Vec<Option<PathBuf>> = consensuses
        .iter()
        .map(|c| {
            select_exit_list(&c.stamp, &exit_lists, config.exit_list_match).map(|e| e.path.clone())
        })
        .collect();

    let mut exit_list_paths: Vec<PathBuf> = pairing.iter().flatten().cloned().collect();
    exit_list_paths.sort();
    exit_list_paths.dedup();

    let consensus_paths: Vec<PathBuf> = consensuses.iter().map(|c| c.path.clone()).collect();
    let loaded_consensuses = load_all(&ConsensusParser, &consensus_paths, config.workers);
    let loaded_exit_lists: HashMap<PathBuf, _> = exit_list_paths
        .iter()
        .cloned()
        .zip(load_all(&ExitListParser, &exit_list_paths, config.workers))
        .filter_map(|(path, loaded)| loaded.map(|l| (path, l)))
        .collect();
    summary.exit_list_files = loaded_exit_lists.len();

    for ((file, loaded), exit_list) in consensuses.iter().zip(loaded_consensuses).zip(&pairing) {
        let Some(loaded) = loaded else {
            continue;
        };
        summary.consensus_files += 1;

        let baseline = ingest_snapshot(&mut records, file.bucket, &loaded.entries);
        tracing::info!(
            bucket = file.bucket,
            created = baseline.created,
            already_known = baseline.already_known,
            not_exiting = baseline.not_exiting,
            "Ingested {}",
            file.path.display()
        );

        let Some(exit_list) = exit_list.as_ref().and_then(|p| loaded_exit_lists.get(p)) else {
            tracing::debug!(bucket = file.bucket, "No exit-list for {}", file.path.display());
            continue;
        };

        let reconciled = reconcile_bucket(&mut records, file.bucket, &exit_list.entries);
        tracing::info!(
            bucket = file.bucket,
            updated = reconciled.updated,
            unknown = reconciled.unknown,
            other_bucket = reconciled.other_bucket,
            "Reconciled addresses from {}",
            exit_list.path.display()
        );
        summary.addresses_reconciled += reconciled.updated;
    }

    let descriptor_paths = discover_descriptor_files(&config.descriptors)?;
    let loaded_descriptors: Vec<_> = load_all(&DescriptorParser, &descriptor_paths, config.workers)
        .into_iter()
        .flatten()
        .collect();
    summary.descriptor_files = loaded_descriptors.len();

    let overrides = apply_descriptors(
        &mut records,
        loaded_descriptors.iter().flat_map(|l| l.entries.iter()),
    );
    tracing::info!(
        overridden = overrides.overridden,
        unknown = overrides.unknown,
        "Applied descriptor policies"
    );
    summary.policies_overridden = overrides.overridden;

    summary.relays = emit_to_path(&records, &config.output)?;

    increment(
        "exitfuse_addresses_reconciled_total",
        summary.addresses_reconciled as u64,
    );
    increment(
        "exitfuse_policies_overridden_total",
        summary.policies_overridden as u64,
    );
    set_gauge("exitfuse_relays_total", summary.relays as f64);

    Ok(summary)
}
