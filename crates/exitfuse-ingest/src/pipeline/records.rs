//! The owned record set shared by the fusion stages.

use exitfuse_core::RelayRecord;
use std::collections::BTreeMap;

/// Relay records keyed by fingerprint.
///
/// Iteration is in ascending fingerprint order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: BTreeMap<String, RelayRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` unless its fingerprint is already present.
    ///
    /// Returns whether the record was inserted. An existing record is never
    /// overwritten.
    pub fn insert_new(&mut self, record: RelayRecord) -> bool {
        if self.records.contains_key(&record.fingerprint) {
            return false;
        }
        self.records.insert(record.fingerprint.clone(), record);
        true
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.records.contains_key(fingerprint)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&RelayRecord> {
        self.records.get(fingerprint)
    }

    pub fn get_mut(&mut self, fingerprint: &str) -> Option<&mut RelayRecord> {
        self.records.get_mut(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelayRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
