//! Coarse exit summary carried by consensus entries.
//!
//! A consensus only says which ports a relay accepts or rejects, never
//! which addresses. A summary written `accept 80,443` rejects everything
//! else; one written `reject 25,119` accepts everything else.

use crate::MAX_PORT;
use crate::record::PolicyRule;

/// One port range of a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSegment {
    pub is_accept: bool,
    pub min_port: u16,
    pub max_port: u16,
}

impl PortSegment {
    /// Whether this segment names every port.
    fn covers_all_ports(&self) -> bool {
        self.min_port <= 1 && self.max_port == MAX_PORT
    }
}

/// Exit-permission summary of one consensus entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSummary {
    /// Whether ports named by no segment are permitted.
    pub default_allowed: bool,

    /// Port segments in document order.
    pub segments: Vec<PortSegment>,
}

impl ExitSummary {
    /// Summary accepting exactly the given port ranges.
    pub fn accept(ranges: impl IntoIterator<Item = (u16, u16)>) -> Self {
        Self::from_ranges(true, ranges)
    }

    /// Summary rejecting exactly the given port ranges.
    pub fn reject(ranges: impl IntoIterator<Item = (u16, u16)>) -> Self {
        Self::from_ranges(false, ranges)
    }

    fn from_ranges(is_accept: bool, ranges: impl IntoIterator<Item = (u16, u16)>) -> Self {
        Self {
            default_allowed: !is_accept,
            segments: ranges
                .into_iter()
                .map(|(min_port, max_port)| PortSegment {
                    is_accept,
                    min_port,
                    max_port,
                })
                .collect(),
        }
    }

    /// Whether the relay permits exiting to any port at all.
    ///
    /// An accept segment permits exiting when it names a port that no earlier
    /// reject segment already covers. A reject segment covering every port
    /// ends the walk. Otherwise the default decides, unless the rejected
    /// segments jointly cover every port.
    pub fn is_exiting_allowed(&self) -> bool {
        let mut rejected: Vec<(u16, u16)> = Vec::new();

        for segment in &self.segments {
            if segment.is_accept {
                if !ranges_cover(&rejected, segment.min_port, segment.max_port) {
                    return true;
                }
            } else if segment.covers_all_ports() {
                return false;
            } else {
                rejected.push((segment.min_port, segment.max_port));
            }
        }

        self.default_allowed && !ranges_cover(&rejected, 1, MAX_PORT)
    }

    /// Wildcard-address rules mirroring the segments, in order.
    pub fn provisional_rules(&self) -> Vec<PolicyRule> {
        self.segments
            .iter()
            .map(|s| PolicyRule::wildcard(s.is_accept, s.min_port, s.max_port))
            .collect()
    }
}

/// Whether the union of `ranges` covers every port in `lo..=hi`.
fn ranges_cover(ranges: &[(u16, u16)], lo: u16, hi: u16) -> bool {
    if lo > hi {
        return true;
    }

    let mut sorted = ranges.to_vec();
    sorted.sort_unstable();

    // First port not yet known to be covered
    let mut next = u32::from(lo);
    for (min, max) in sorted {
        if u32::from(min) > next {
            break;
        }
        next = next.max(u32::from(max) + 1);
        if next > u32::from(hi) {
            return true;
        }
    }
    next > u32::from(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_list_is_exiting() {
        let summary = ExitSummary::accept([(80, 80), (443, 443)]);
        assert!(!summary.default_allowed);
        assert!(summary.is_exiting_allowed());
    }

    #[test]
    fn test_empty_accept_list_is_not_exiting() {
        let summary = ExitSummary::accept(std::iter::empty());
        assert!(!summary.is_exiting_allowed());
    }

    #[test]
    fn test_reject_all_is_not_exiting() {
        let summary = ExitSummary::reject([(1, 65535)]);
        assert!(summary.default_allowed);
        assert!(!summary.is_exiting_allowed());
    }

    #[test]
    fn test_reject_some_is_exiting() {
        let summary = ExitSummary::reject([(25, 25), (119, 119)]);
        assert!(summary.is_exiting_allowed());
    }

    #[test]
    fn test_reject_pieces_covering_everything_is_not_exiting() {
        let summary = ExitSummary::reject([(1, 1000), (1001, 65535)]);
        assert!(!summary.is_exiting_allowed());
    }

    #[test]
    fn test_default_allow_without_segments_is_exiting() {
        let summary = ExitSummary::reject(std::iter::empty());
        assert!(summary.is_exiting_allowed());
        assert!(summary.provisional_rules().is_empty());
    }

    #[test]
    fn test_accept_shadowed_by_earlier_reject() {
        let summary = ExitSummary {
            default_allowed: false,
            segments: vec![
                PortSegment {
                    is_accept: false,
                    min_port: 80,
                    max_port: 90,
                },
                PortSegment {
                    is_accept: true,
                    min_port: 85,
                    max_port: 86,
                },
            ],
        };
        assert!(!summary.is_exiting_allowed());
    }

    #[test]
    fn test_provisional_rules_preserve_order() {
        let summary = ExitSummary::accept([(443, 443), (20, 23), (80, 80)]);
        let rules = summary.provisional_rules();
        let ports: Vec<_> = rules.iter().map(|r| (r.min_port, r.max_port)).collect();
        assert_eq!(ports, vec![(443, 443), (20, 23), (80, 80)]);
        assert!(rules.iter().all(|r| r.is_address_wildcard && r.is_accept));
    }

    #[test]
    fn test_ranges_cover() {
        assert!(ranges_cover(&[(1, 10), (11, 20)], 1, 20));
        assert!(ranges_cover(&[(5, 65535), (1, 4)], 1, 65535));
        assert!(!ranges_cover(&[(1, 10), (12, 20)], 1, 20));
        assert!(!ranges_cover(&[], 1, 1));
        assert!(ranges_cover(&[(1, 65535)], 80, 80));
    }
}
