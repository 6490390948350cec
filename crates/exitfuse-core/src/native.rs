//! Native descriptor policy rules.
//!
//! Descriptors carry full exit patterns (`reject 10.0.0.0/8:*`,
//! `accept [2001:db8::]/32:443`, `accept *:80`). A [`NativeRule`] is the
//! parsed form; [`NativeRule::to_policy_rule`] turns it into the emitted
//! [`PolicyRule`], attaching a mask only for ranges wider than one host.

use crate::error::{Error, Result};
use crate::record::PolicyRule;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// IP address family of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Prefix length that denotes exactly one host.
    pub fn host_prefix_len(self) -> u8 {
        match self {
            Self::Ipv4 => 32,
            Self::Ipv6 => 128,
        }
    }

    pub fn of(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ipv4 => "IPv4",
            Self::Ipv6 => "IPv6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Destination address side of a native rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPattern {
    /// `*`: any address of any family.
    Any,
    /// An address with a prefix length (`/32` or `/128` for a single host).
    Network { address: IpAddr, prefix_len: u8 },
}

impl AddressPattern {
    /// A network pattern, validating the prefix length against the family.
    pub fn network(address: IpAddr, prefix_len: u8) -> Result<Self> {
        let family = AddressFamily::of(&address);
        if prefix_len > family.host_prefix_len() {
            return Err(Error::InvalidPrefix {
                family: family.label(),
                bits: prefix_len,
            });
        }
        Ok(Self::Network {
            address,
            prefix_len,
        })
    }

    /// A single-host pattern.
    pub fn host(address: IpAddr) -> Self {
        let prefix_len = AddressFamily::of(&address).host_prefix_len();
        Self::Network {
            address,
            prefix_len,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn address(&self) -> Option<IpAddr> {
        match self {
            Self::Any => None,
            Self::Network { address, .. } => Some(*address),
        }
    }

    pub fn family(&self) -> Option<AddressFamily> {
        self.address().as_ref().map(AddressFamily::of)
    }

    pub fn prefix_len(&self) -> Option<u8> {
        match self {
            Self::Any => None,
            Self::Network { prefix_len, .. } => Some(*prefix_len),
        }
    }
}

/// One accept/reject line of a descriptor's exit policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeRule {
    pub is_accept: bool,
    pub address: AddressPattern,
    pub min_port: u16,
    pub max_port: u16,
}

impl NativeRule {
    /// Build a rule, rejecting inverted port ranges.
    pub fn new(
        is_accept: bool,
        address: AddressPattern,
        min_port: u16,
        max_port: u16,
    ) -> Result<Self> {
        if min_port > max_port {
            return Err(Error::InvalidPortRange {
                min: min_port,
                max: max_port,
            });
        }
        Ok(Self {
            is_accept,
            address,
            min_port,
            max_port,
        })
    }

    /// Translate into the emitted rule form.
    ///
    /// The mask is present only when the prefix is shorter than a single
    /// host of the rule's family.
    pub fn to_policy_rule(&self) -> PolicyRule {
        match self.address {
            AddressPattern::Any => {
                PolicyRule::wildcard(self.is_accept, self.min_port, self.max_port)
            }
            AddressPattern::Network {
                address,
                prefix_len,
            } => {
                let family = AddressFamily::of(&address);
                let mask = (prefix_len < family.host_prefix_len())
                    .then(|| netmask(family, prefix_len).to_string());
                PolicyRule::scoped(
                    address.to_string(),
                    mask,
                    self.is_accept,
                    self.min_port,
                    self.max_port,
                )
            }
        }
    }
}

/// Netmask with the leading `prefix_len` bits set.
///
/// Prefix lengths beyond the family's width saturate to a host mask.
pub fn netmask(family: AddressFamily, prefix_len: u8) -> IpAddr {
    match family {
        AddressFamily::Ipv4 => {
            let bits = u32::from(prefix_len.min(32));
            let mask = u32::MAX.checked_shl(32 - bits).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(mask))
        }
        AddressFamily::Ipv6 => {
            let bits = u32::from(prefix_len.min(128));
            let mask = u128::MAX.checked_shl(128 - bits).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(mask))
        }
    }
}
