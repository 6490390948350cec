//! Address reconciliation from exit-list snapshots.
//!
//! Exit-lists record the addresses relays were actually seen exiting from.
//! Each consensus snapshot is paired with at most one exit-list, and that
//! exit-list may only correct relays that snapshot admitted.

use super::RecordSet;
use crate::bucket::SnapshotStamp;
use crate::config::MatchGranularity;
use crate::snapshot::ExitListFile;
use crate::source::{ExitListEntry, Observation};
use exitfuse_core::Bucket;

/// Outcome of reconciling one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Records whose address was replaced.
    pub updated: usize,

    /// Entries naming a fingerprint with no record.
    pub unknown: usize,

    /// Entries whose record belongs to another bucket.
    pub other_bucket: usize,

    /// Entries whose record was already reconciled.
    pub already_reconciled: usize,
}

/// The observation with the latest time. Ties keep the earliest in order.
pub fn latest_observation(observations: &[Observation]) -> Option<&Observation> {
    let mut latest: Option<&Observation> = None;
    for observation in observations {
        if latest.is_none_or(|l| observation.observed_at > l.observed_at) {
            latest = Some(observation);
        }
    }
    latest
}

/// Pick the exit-list to pair with a consensus.
///
/// Candidates must share the consensus's date prefix at `granularity`.
/// Among those, the one taken closest to the consensus wins; ties go to
/// the lexicographically first filename.
pub fn select_exit_list<'a>(
    consensus: &SnapshotStamp,
    candidates: &'a [ExitListFile],
    granularity: MatchGranularity,
) -> Option<&'a ExitListFile> {
    let wanted = match_prefix(consensus, granularity);
    let distance = |c: &ExitListFile| (c.stamp.taken_at - consensus.taken_at).num_seconds().abs();

    candidates
        .iter()
        .filter(|c| match_prefix(&c.stamp, granularity) == wanted)
        .min_by(|a, b| {
            distance(*a)
                .cmp(&distance(*b))
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
}

fn match_prefix(stamp: &SnapshotStamp, granularity: MatchGranularity) -> &str {
    match granularity {
        MatchGranularity::Day => stamp.day_prefix(),
        MatchGranularity::Hour => stamp.hour_prefix(),
    }
}

/// Apply one exit-list's observations to the records of `bucket`.
pub fn reconcile_bucket<'a>(
    records: &mut RecordSet,
    bucket: Bucket,
    entries: impl IntoIterator<Item = &'a ExitListEntry>,
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    for entry in entries {
        let Some(observation) = latest_observation(&entry.observations) else {
            continue;
        };
        let Some(record) = records.get_mut(&entry.fingerprint) else {
            stats.unknown += 1;
            continue;
        };

        if record.age_bucket != bucket {
            stats.other_bucket += 1;
        } else if record.reconcile_address(&observation.address, bucket) {
            tracing::debug!(
                fingerprint = %entry.fingerprint,
                address = %observation.address,
                bucket,
                "address reconciled"
            );
            stats.updated += 1;
        } else {
            stats.already_reconciled += 1;
        }
    }

    stats
}
