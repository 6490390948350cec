//! Relay server descriptor parser.
//!
//! Descriptor files concatenate many descriptors. Each starts with a
//! `router` line; only the fingerprint, publication time and the ordered
//! `accept`/`reject` lines are kept:
//!
//! ```text
//! @downloaded-at 2014-03-27 05:00:00
//! router relayA 1.2.3.4 9001 0 0
//! published 2014-03-27 04:12:33
//! fingerprint 0011 BD24 85AD 45D9 84EC 4159 C88F C066 E5E3 300E
//! reject 0.0.0.0/8:*
//! reject [2001:db8::]/32:25
//! accept *:80-443
//! reject *:*
//! router-signature
//! -----BEGIN SIGNATURE-----
//! ...
//! -----END SIGNATURE-----
//! ```

use super::{DescriptorEntry, DocumentParser, ParseStats, normalize_fingerprint, parse_port_spec};
use crate::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use exitfuse_core::{AddressPattern, NativeRule};
use std::io::BufRead;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const PUBLISHED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parser for concatenated server descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorParser;

#[derive(Default)]
struct Pending {
    line: usize,
    fingerprint: Option<String>,
    published: Option<DateTime<Utc>>,
    rules: Vec<NativeRule>,
    error: Option<String>,
}

impl Pending {
    fn fail(&mut self, reason: String) {
        self.error.get_or_insert(reason);
    }

    fn finish<F>(self, handler: &mut F, stats: &mut ParseStats)
    where
        F: FnMut(DescriptorEntry),
    {
        let result = match (self.error, self.fingerprint) {
            (Some(reason), _) => Err(reason),
            (None, None) => Err("no fingerprint line".to_string()),
            (None, Some(fingerprint)) => Ok(DescriptorEntry {
                fingerprint,
                published: self.published,
                rules: self.rules,
            }),
        };

        match result {
            Ok(entry) => {
                stats.record(true);
                handler(entry);
            }
            Err(reason) => {
                tracing::warn!("Line {}: skipping descriptor: {}", self.line, reason);
                stats.record(false);
            }
        }
    }
}

impl DocumentParser for DescriptorParser {
    type Entry = DescriptorEntry;

    fn name(&self) -> &'static str {
        "descriptor"
    }

    fn parse<R, F>(&self, reader: R, mut handler: F) -> Result<ParseStats>
    where
        R: BufRead,
        F: FnMut(DescriptorEntry),
    {
        let mut stats = ParseStats::default();
        let mut current: Option<Pending> = None;
        let mut in_object = false;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_num = idx + 1;
            let trimmed = line.trim();

            if in_object {
                if trimmed.starts_with("-----END") {
                    in_object = false;
                }
                continue;
            }
            if trimmed.starts_with("-----BEGIN") {
                in_object = true;
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with('@') {
                continue;
            }

            let trimmed = trimmed.strip_prefix("opt ").unwrap_or(trimmed);
            let (keyword, args) = trimmed
                .split_once(char::is_whitespace)
                .map(|(k, rest)| (k, rest.trim()))
                .unwrap_or((trimmed, ""));

            if keyword == "router" {
                if let Some(entry) = current.take() {
                    entry.finish(&mut handler, &mut stats);
                }
                current = Some(Pending {
                    line: line_num,
                    ..Pending::default()
                });
                continue;
            }

            let Some(entry) = current.as_mut() else {
                continue;
            };

            match keyword {
                "fingerprint" => {
                    let joined: String = args.split_whitespace().collect();
                    match normalize_fingerprint(&joined) {
                        Ok(fp) => entry.fingerprint = Some(fp),
                        Err(reason) => entry.fail(reason),
                    }
                }
                "published" => match NaiveDateTime::parse_from_str(args, PUBLISHED_FORMAT) {
                    Ok(naive) => entry.published = Some(naive.and_utc()),
                    Err(e) => entry.fail(format!("invalid published time '{args}': {e}")),
                },
                "accept" | "reject" => match parse_rule(keyword == "accept", args) {
                    Ok(rule) => entry.rules.push(rule),
                    Err(reason) => entry.fail(reason),
                },
                _ => {}
            }
        }

        if let Some(entry) = current.take() {
            entry.finish(&mut handler, &mut stats);
        }

        Ok(stats)
    }
}

/// Parse `addrspec:portspec`.
fn parse_rule(is_accept: bool, pattern: &str) -> std::result::Result<NativeRule, String> {
    let (addr, ports) = pattern
        .rsplit_once(':')
        .ok_or_else(|| format!("exit pattern '{pattern}' has no port"))?;

    let address = parse_address_spec(addr)?;
    let (min_port, max_port) = parse_port_spec(ports)?;

    NativeRule::new(is_accept, address, min_port, max_port).map_err(|e| e.to_string())
}

/// Parse the address side of an exit pattern.
fn parse_address_spec(spec: &str) -> std::result::Result<AddressPattern, String> {
    match spec {
        "*" => return Ok(AddressPattern::Any),
        "*4" => return network(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        "*6" => return network(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        _ => {}
    }

    let (host, mask) = match spec.split_once('/') {
        Some((host, mask)) => (host, Some(mask)),
        None => (spec, None),
    };

    if let Some(inner) = host.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| format!("unterminated IPv6 address '{spec}'"))?;
        let address: Ipv6Addr = inner
            .parse()
            .map_err(|e| format!("invalid IPv6 address '{inner}': {e}"))?;
        return match mask {
            None => Ok(AddressPattern::host(IpAddr::V6(address))),
            Some(bits) => network(IpAddr::V6(address), parse_bits(bits)?),
        };
    }

    let address: Ipv4Addr = host
        .parse()
        .map_err(|e| format!("invalid IPv4 address '{host}': {e}"))?;
    match mask {
        None => Ok(AddressPattern::host(IpAddr::V4(address))),
        Some(mask) if mask.contains('.') => {
            network(IpAddr::V4(address), dotted_mask_to_prefix(mask)?)
        }
        Some(bits) => network(IpAddr::V4(address), parse_bits(bits)?),
    }
}

fn network(address: IpAddr, prefix_len: u8) -> std::result::Result<AddressPattern, String> {
    AddressPattern::network(address, prefix_len).map_err(|e| e.to_string())
}

fn parse_bits(bits: &str) -> std::result::Result<u8, String> {
    bits.parse::<u8>()
        .map_err(|e| format!("invalid prefix length '{bits}': {e}"))
}

/// Convert `255.255.0.0` into `16`. Only contiguous masks are accepted.
fn dotted_mask_to_prefix(mask: &str) -> std::result::Result<u8, String> {
    let value = u32::from(
        mask.parse::<Ipv4Addr>()
            .map_err(|e| format!("invalid netmask '{mask}': {e}"))?,
    );
    let prefix = value.leading_ones();
    if value.checked_shl(prefix).unwrap_or(0) != 0 {
        return Err(format!("non-contiguous netmask '{mask}'"));
    }
    // leading_ones() is at most 32
    Ok(prefix as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    const FP: &str = "0011BD2485AD45D984EC4159C88FC066E5E3300E";

    fn parse_all(doc: &str) -> (Vec<DescriptorEntry>, ParseStats) {
        let mut entries = Vec::new();
        let stats = DescriptorParser
            .parse(Cursor::new(doc), |e| entries.push(e))
            .unwrap();
        (entries, stats)
    }

    fn v4(s: &str) -> IpAddr {
        IpAddr::V4(s.parse().unwrap())
    }

    #[test]
    fn test_parse_descriptor() {
        let doc = "@downloaded-at 2014-03-27 05:00:00\n\
                   @source \"1.2.3.4\"\n\
                   router relayA 1.2.3.4 9001 0 0\n\
                   published 2014-03-27 04:12:33\n\
                   opt fingerprint 0011 BD24 85AD 45D9 84EC 4159 C88F C066 E5E3 300E\n\
                   reject 0.0.0.0/8:*\n\
                   reject [2001:db8::]/32:25\n\
                   accept *:80-443\n\
                   reject *:*\n\
                   router-signature\n\
                   -----BEGIN SIGNATURE-----\n\
                   accept *:1-65535\n\
                   -----END SIGNATURE-----\n";
        let (entries, stats) = parse_all(doc);

        assert_eq!(stats.entries_parsed, 1);
        let entry = &entries[0];
        assert_eq!(entry.fingerprint, FP);
        assert_eq!(
            entry.published,
            Some(Utc.with_ymd_and_hms(2014, 3, 27, 4, 12, 33).unwrap())
        );
        assert_eq!(entry.rules.len(), 4);

        assert!(!entry.rules[0].is_accept);
        assert_eq!(entry.rules[0].address.prefix_len(), Some(8));
        assert_eq!((entry.rules[0].min_port, entry.rules[0].max_port), (1, 65535));

        assert_eq!(
            entry.rules[1].address.address(),
            Some("2001:db8::".parse().unwrap())
        );
        assert_eq!((entry.rules[1].min_port, entry.rules[1].max_port), (25, 25));

        assert!(entry.rules[2].is_accept);
        assert!(entry.rules[2].address.is_wildcard());
        assert_eq!((entry.rules[2].min_port, entry.rules[2].max_port), (80, 443));
    }

    #[test]
    fn test_multiple_descriptors_and_missing_published() {
        let doc = format!(
            "router a 1.1.1.1 9001 0 0\n\
             fingerprint {FP}\n\
             accept *:*\n\
             router b 2.2.2.2 9001 0 0\n\
             published 2014-03-27 04:12:33\n\
             reject *:*\n"
        );
        let (entries, stats) = parse_all(&doc);

        assert_eq!(entries.len(), 1);
        assert!(entries[0].published.is_none());
        assert_eq!(stats.entries_skipped, 1);
    }

    #[test]
    fn test_bad_rule_skips_descriptor() {
        let doc = format!(
            "router a 1.1.1.1 9001 0 0\n\
             fingerprint {FP}\n\
             reject 10.0.0.0/33:*\n\
             router b 1.1.1.1 9001 0 0\n\
             fingerprint {FP}\n\
             accept *:443\n"
        );
        let (entries, stats) = parse_all(&doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rules.len(), 1);
        assert_eq!(stats.entries_skipped, 1);
    }

    #[test]
    fn test_parse_address_spec_forms() {
        assert_eq!(parse_address_spec("*").unwrap(), AddressPattern::Any);
        assert_eq!(
            parse_address_spec("*4").unwrap(),
            AddressPattern::network(v4("0.0.0.0"), 0).unwrap()
        );
        assert_eq!(parse_address_spec("*6").unwrap().prefix_len(), Some(0));
        assert_eq!(
            parse_address_spec("1.2.3.4").unwrap(),
            AddressPattern::host(v4("1.2.3.4"))
        );
        assert_eq!(
            parse_address_spec("10.0.0.0/255.0.0.0").unwrap(),
            AddressPattern::network(v4("10.0.0.0"), 8).unwrap()
        );
        assert_eq!(
            parse_address_spec("[::1]").unwrap().prefix_len(),
            Some(128)
        );
        assert!(parse_address_spec("10.0.0.0/255.0.255.0").is_err());
        assert!(parse_address_spec("[::1").is_err());
        assert!(parse_address_spec("[::1]/129").is_err());
        assert!(parse_address_spec("example.com").is_err());
    }

    #[test]
    fn test_parse_rule_requires_port() {
        assert!(parse_rule(true, "1.2.3.4").is_err());
        assert!(parse_rule(true, "1.2.3.4:90-80").is_err());
        let rule = parse_rule(false, "[2001:db8::1]:*").unwrap();
        assert_eq!(rule.address.prefix_len(), Some(128));
    }

    #[test]
    fn test_dotted_mask_to_prefix() {
        assert_eq!(dotted_mask_to_prefix("255.255.255.255"), Ok(32));
        assert_eq!(dotted_mask_to_prefix("255.255.240.0"), Ok(20));
        assert_eq!(dotted_mask_to_prefix("0.0.0.0"), Ok(0));
        assert!(dotted_mask_to_prefix("0.255.0.0").is_err());
    }
}
