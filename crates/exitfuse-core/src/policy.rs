//! Exit policy evaluation.
//!
//! An [`ExitPolicy`] is a record's rule list compiled for matching: rule
//! addresses and masks are parsed once so that evaluating many targets
//! against many relays stays cheap.

use crate::record::{PolicyRule, RelayRecord};
use std::net::IpAddr;

/// Address matcher compiled from one [`PolicyRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matcher {
    Any,
    Host(IpAddr),
    V4Network { base: u32, mask: u32 },
    V6Network { base: u128, mask: u128 },
    /// Unparsable address or mask; the rule can never apply.
    Never,
}

impl Matcher {
    fn compile(rule: &PolicyRule) -> Self {
        if rule.is_address_wildcard {
            return Self::Any;
        }

        let Some(address) = rule.address.as_deref().and_then(parse_ip) else {
            return Self::Never;
        };

        let Some(mask) = rule.mask.as_deref() else {
            return Self::Host(address);
        };

        match (address, parse_ip(mask)) {
            (IpAddr::V4(a), Some(IpAddr::V4(m))) => {
                let mask = u32::from(m);
                Self::V4Network {
                    base: u32::from(a) & mask,
                    mask,
                }
            }
            (IpAddr::V6(a), Some(IpAddr::V6(m))) => {
                let mask = u128::from(m);
                Self::V6Network {
                    base: u128::from(a) & mask,
                    mask,
                }
            }
            _ => Self::Never,
        }
    }

    fn matches(&self, ip: IpAddr) -> bool {
        match (*self, ip) {
            (Self::Any, _) => true,
            (Self::Host(host), ip) => host == ip,
            (Self::V4Network { base, mask }, IpAddr::V4(ip)) => u32::from(ip) & mask == base,
            (Self::V6Network { base, mask }, IpAddr::V6(ip)) => u128::from(ip) & mask == base,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    matcher: Matcher,
    is_accept: bool,
    min_port: u16,
    max_port: u16,
}

/// A relay's ordered rules plus its default, ready for evaluation.
#[derive(Debug, Clone)]
pub struct ExitPolicy {
    rules: Vec<CompiledRule>,
    default_allowed: bool,
}

impl ExitPolicy {
    pub fn compile(rules: &[PolicyRule], default_allowed: bool) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|r| CompiledRule {
                    matcher: Matcher::compile(r),
                    is_accept: r.is_accept,
                    min_port: r.min_port,
                    max_port: r.max_port,
                })
                .collect(),
            default_allowed,
        }
    }

    pub fn for_record(record: &RelayRecord) -> Self {
        Self::compile(&record.rules, record.default_allowed)
    }

    /// Whether traffic to `ip:port` is allowed.
    ///
    /// The first rule covering both the port and the address decides;
    /// when none does, the default applies.
    pub fn allows(&self, ip: IpAddr, port: u16) -> bool {
        self.rules
            .iter()
            .find(|r| r.min_port <= port && port <= r.max_port && r.matcher.matches(ip))
            .map_or(self.default_allowed, |r| r.is_accept)
    }
}

/// Parse an address, tolerating the bracketed IPv6 form.
fn parse_ip(s: &str) -> Option<IpAddr> {
    s.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}
