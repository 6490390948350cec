//! The emitted relay record and its policy rules.
//!
//! One [`RelayRecord`] exists per relay fingerprint. Its serialized form is
//! one JSON object per line in the exit policy table:
//!
//! ```text
//! {"Fingerprint":"AAAA","Address":"1.2.3.4","IsAllowedDefault":true,
//!  "Rules":[{"IsAddressWildcard":true,"IsAccept":true,"MinPort":1,"MaxPort":65535}],
//!  "Tminus":0}
//! ```

use crate::summary::ExitSummary;
use serde::{Deserialize, Serialize};

/// Whole hours between "now" and the consensus snapshot that admitted a relay.
pub type Bucket = i64;

/// A single accept/reject rule over an address range and an inclusive port range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyRule {
    /// Rule applies to any destination address.
    #[serde(default)]
    pub is_address_wildcard: bool,

    /// Destination address; absent for wildcard rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Netmask for range rules; absent when the rule names a single host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,

    /// Accept (true) or reject (false).
    pub is_accept: bool,

    /// Lowest port covered, inclusive.
    pub min_port: u16,

    /// Highest port covered, inclusive.
    pub max_port: u16,
}

impl PolicyRule {
    /// A rule matching any address on the given ports.
    pub fn wildcard(is_accept: bool, min_port: u16, max_port: u16) -> Self {
        Self {
            is_address_wildcard: true,
            address: None,
            mask: None,
            is_accept,
            min_port,
            max_port,
        }
    }

    /// A rule scoped to one host (`mask` is `None`) or one network.
    pub fn scoped(
        address: impl Into<String>,
        mask: Option<String>,
        is_accept: bool,
        min_port: u16,
        max_port: u16,
    ) -> Self {
        Self {
            is_address_wildcard: false,
            address: Some(address.into()),
            mask,
            is_accept,
            min_port,
            max_port,
        }
    }
}

/// Consolidated view of one exit-permitted relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRecord {
    /// Relay identity fingerprint (upper-case hex).
    #[serde(rename = "Fingerprint")]
    pub fingerprint: String,

    /// Best-known external address.
    #[serde(rename = "Address")]
    pub address: String,

    /// Whether traffic matched by no rule is permitted.
    #[serde(rename = "IsAllowedDefault")]
    pub default_allowed: bool,

    /// Ordered rules; the first match wins.
    #[serde(rename = "Rules", default)]
    pub rules: Vec<PolicyRule>,

    /// Hours-ago bucket of the consensus that admitted the relay.
    #[serde(rename = "Tminus", default)]
    pub age_bucket: Bucket,

    #[serde(skip)]
    address_reconciled: bool,
}

impl RelayRecord {
    /// Build the provisional record for a relay first seen in a consensus.
    ///
    /// The rules mirror the summary's port segments as wildcard-address rules.
    pub fn baseline(
        fingerprint: impl Into<String>,
        address: impl Into<String>,
        age_bucket: Bucket,
        summary: &ExitSummary,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            address: address.into(),
            default_allowed: summary.default_allowed,
            rules: summary.provisional_rules(),
            age_bucket,
            address_reconciled: false,
        }
    }

    /// Replace the address with an externally verified one.
    ///
    /// Applies only when the verification belongs to the same bucket as the
    /// record and no earlier verification has been applied. Returns whether
    /// the address was replaced.
    pub fn reconcile_address(&mut self, address: &str, bucket: Bucket) -> bool {
        if self.age_bucket != bucket || self.address_reconciled {
            return false;
        }
        self.address = address.to_string();
        self.address_reconciled = true;
        true
    }

    /// Whether [`reconcile_address`](Self::reconcile_address) has already applied.
    pub fn is_address_reconciled(&self) -> bool {
        self.address_reconciled
    }

    /// Swap in an authoritative rule list, replacing every existing rule.
    pub fn override_policy(&mut self, rules: Vec<PolicyRule>, default_allowed: bool) {
        self.rules = rules;
        self.default_allowed = default_allowed;
    }

    /// Number of wildcard-address rules.
    pub fn wildcard_rule_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_address_wildcard).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept_all_summary() -> ExitSummary {
        ExitSummary::reject(std::iter::empty())
    }

    #[test]
    fn test_wildcard_rule_serializes_without_address_or_mask() {
        let rule = PolicyRule::wildcard(true, 1, 65535);
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(
            json,
            r#"{"IsAddressWildcard":true,"IsAccept":true,"MinPort":1,"MaxPort":65535}"#
        );
    }

    #[test]
    fn test_host_rule_serializes_without_mask() {
        let rule = PolicyRule::scoped("10.0.0.1", None, false, 25, 25);
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains(r#""Address":"10.0.0.1""#));
        assert!(!json.contains("Mask"));
    }

    #[test]
    fn test_network_rule_serializes_mask() {
        let rule = PolicyRule::scoped("10.0.0.0", Some("255.255.255.0".into()), false, 1, 65535);
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains(r#""Mask":"255.255.255.0""#));
    }

    #[test]
    fn test_record_field_names_and_order() {
        let mut record = RelayRecord::baseline("AAAA", "1.2.3.4", 0, &accept_all_summary());
        record.override_policy(vec![PolicyRule::wildcard(true, 1, 65535)], true);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"Fingerprint":"AAAA","Address":"1.2.3.4","IsAllowedDefault":true,"Rules":[{"IsAddressWildcard":true,"IsAccept":true,"MinPort":1,"MaxPort":65535}],"Tminus":0}"#
        );
    }

    #[test]
    fn test_reconciled_flag_is_not_serialized() {
        let mut record = RelayRecord::baseline("AAAA", "1.2.3.4", 2, &accept_all_summary());
        assert!(record.reconcile_address("5.6.7.8", 2));
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("reconciled"));
    }

    #[test]
    fn test_reconcile_requires_matching_bucket() {
        let mut record = RelayRecord::baseline("AAAA", "1.2.3.4", 3, &accept_all_summary());
        assert!(!record.reconcile_address("5.6.7.8", 2));
        assert_eq!(record.address, "1.2.3.4");
        assert!(!record.is_address_reconciled());
    }

    #[test]
    fn test_reconcile_applies_at_most_once() {
        let mut record = RelayRecord::baseline("AAAA", "1.2.3.4", 3, &accept_all_summary());
        assert!(record.reconcile_address("5.6.7.8", 3));
        assert!(!record.reconcile_address("9.9.9.9", 3));
        assert_eq!(record.address, "5.6.7.8");
    }

    #[test]
    fn test_baseline_mirrors_summary_segments() {
        let summary = ExitSummary::accept([(80, 80), (443, 443)]);
        let record = RelayRecord::baseline("BBBB", "1.2.3.4", 1, &summary);
        assert!(!record.default_allowed);
        assert_eq!(record.rules.len(), 2);
        assert_eq!(record.wildcard_rule_count(), 2);
        assert_eq!(record.rules[1], PolicyRule::wildcard(true, 443, 443));
    }

    #[test]
    fn test_override_replaces_all_rules() {
        let summary = ExitSummary::accept([(80, 80), (443, 443)]);
        let mut record = RelayRecord::baseline("BBBB", "1.2.3.4", 1, &summary);
        record.override_policy(vec![PolicyRule::scoped("10.0.0.1", None, false, 1, 65535)], true);
        assert_eq!(record.rules.len(), 1);
        assert_eq!(record.wildcard_rule_count(), 0);
        assert!(record.default_allowed);
    }

    #[test]
    fn test_deserialize_tolerates_missing_optional_fields() {
        let line = r#"{"Rules":[{"IsAccept":true,"MinPort":80,"MaxPort":80,"Address":null,"IsAddressWildcard":true}],"IsAllowedDefault":false,"Address":"111.111.111.111","Fingerprint":"1"}"#;
        let record: RelayRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.age_bucket, 0);
        assert!(record.rules[0].is_address_wildcard);
        assert!(record.rules[0].address.is_none());
    }
}
