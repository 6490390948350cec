//! Authoritative policy override from relay descriptors.

use super::RecordSet;
use crate::source::DescriptorEntry;
use exitfuse_core::PolicyRule;
use std::collections::BTreeMap;

/// Default decision for traffic that matches no descriptor rule.
///
/// A descriptor policy that falls off the end of its rules accepts.
pub const DESCRIPTOR_DEFAULT_ALLOWED: bool = true;

/// Outcome of the override stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideStats {
    /// Records whose rules were replaced.
    pub overridden: usize,

    /// Descriptors naming a fingerprint with no record.
    pub unknown: usize,
}

/// Keep one descriptor per fingerprint.
///
/// The latest `published` time wins. A descriptor with a published time
/// beats one without; otherwise the later one in input order wins.
pub fn latest_descriptors<'a>(
    entries: impl IntoIterator<Item = &'a DescriptorEntry>,
) -> BTreeMap<&'a str, &'a DescriptorEntry> {
    let mut latest: BTreeMap<&str, &DescriptorEntry> = BTreeMap::new();
    for entry in entries {
        match latest.get(entry.fingerprint.as_str()) {
            Some(current) if entry.published < current.published => {}
            _ => {
                latest.insert(&entry.fingerprint, entry);
            }
        }
    }
    latest
}

/// Replace the rules of every recorded relay that has a descriptor.
pub fn apply_descriptors<'a>(
    records: &mut RecordSet,
    descriptors: impl IntoIterator<Item = &'a DescriptorEntry>,
) -> OverrideStats {
    let mut stats = OverrideStats::default();

    for descriptor in latest_descriptors(descriptors).into_values() {
        let Some(record) = records.get_mut(&descriptor.fingerprint) else {
            stats.unknown += 1;
            continue;
        };

        let rules: Vec<PolicyRule> = descriptor.rules.iter().map(|r| r.to_policy_rule()).collect();
        tracing::debug!(
            fingerprint = %descriptor.fingerprint,
            rules = rules.len(),
            "policy overridden"
        );
        record.override_policy(rules, DESCRIPTOR_DEFAULT_ALLOWED);
        stats.overridden += 1;
    }

    stats
}
