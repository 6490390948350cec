//! Baseline ingestion from consensus snapshots.
//!
//! Snapshots must be fed newest first. The first snapshot that names a
//! fingerprint decides its bucket and self-reported address; older
//! snapshots never touch an existing record.

use super::RecordSet;
use crate::source::ConsensusEntry;
use exitfuse_core::{Bucket, RelayRecord};

/// Outcome of ingesting one consensus snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaselineStats {
    /// Records created from this snapshot.
    pub created: usize,

    /// Entries whose fingerprint was already recorded.
    pub already_known: usize,

    /// Entries without exit permission.
    pub not_exiting: usize,
}

/// Add the exit-permitted relays of one snapshot to `records`.
pub fn ingest_snapshot<'a>(
    records: &mut RecordSet,
    bucket: Bucket,
    entries: impl IntoIterator<Item = &'a ConsensusEntry>,
) -> BaselineStats {
    let mut stats = BaselineStats::default();

    for entry in entries {
        if records.contains(&entry.fingerprint) {
            stats.already_known += 1;
            continue;
        }

        let Some(summary) = entry
            .exit_summary
            .as_ref()
            .filter(|s| s.is_exiting_allowed())
        else {
            stats.not_exiting += 1;
            continue;
        };

        let record = RelayRecord::baseline(&entry.fingerprint, &entry.address, bucket, summary);
        tracing::debug!(
            fingerprint = %entry.fingerprint,
            address = %entry.address,
            bucket,
            "new exit relay"
        );
        if records.insert_new(record) {
            stats.created += 1;
        }
    }

    stats
}
