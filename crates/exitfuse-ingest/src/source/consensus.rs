//! Network status consensus parser.
//!
//! Only two line types matter here:
//!
//! ```text
//! r <nickname> <identity> [<digest>] <date> <time> <address> <orport> <dirport>
//! p accept|reject <portlist>
//! ```
//!
//! Each `r` line opens a new entry. The identity is base64 (unpadded) of the
//! 20-byte identity digest; the fingerprint is its upper-case hex form.
//! Microdescriptor consensuses omit the digest field, so the address is
//! located from the end of the line.

use super::{ConsensusEntry, DocumentParser, ParseStats, parse_port_range};
use crate::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use exitfuse_core::ExitSummary;
use std::io::BufRead;
use std::net::Ipv4Addr;

/// Identity digests are SHA-1 sized.
const IDENTITY_LEN: usize = 20;

/// Parser for consensus documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusParser;

/// Entry being assembled from the lines after an `r` line.
struct Pending {
    line: usize,
    fingerprint: String,
    address: String,
    exit_summary: Option<ExitSummary>,
    error: Option<String>,
}

impl Pending {
    fn from_router_line(fields: &[&str], line: usize) -> std::result::Result<Self, String> {
        // nickname identity [digest] date time address orport dirport
        if fields.len() < 7 {
            return Err(format!("'r' line has {} fields", fields.len()));
        }

        let fingerprint = identity_to_fingerprint(fields[1])?;

        let address = fields[fields.len() - 3];
        address
            .parse::<Ipv4Addr>()
            .map_err(|e| format!("invalid address '{address}': {e}"))?;

        Ok(Self {
            line,
            fingerprint,
            address: address.to_string(),
            exit_summary: None,
            error: None,
        })
    }

    fn finish<F>(self, handler: &mut F, stats: &mut ParseStats)
    where
        F: FnMut(ConsensusEntry),
    {
        if let Some(reason) = self.error {
            tracing::warn!("Line {}: skipping consensus entry: {}", self.line, reason);
            stats.record(false);
            return;
        }

        stats.record(true);
        handler(ConsensusEntry {
            fingerprint: self.fingerprint,
            address: self.address,
            exit_summary: self.exit_summary,
        });
    }
}

impl DocumentParser for ConsensusParser {
    type Entry = ConsensusEntry;

    fn name(&self) -> &'static str {
        "consensus"
    }

    fn parse<R, F>(&self, reader: R, mut handler: F) -> Result<ParseStats>
    where
        R: BufRead,
        F: FnMut(ConsensusEntry),
    {
        let mut stats = ParseStats::default();
        let mut current: Option<Pending> = None;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_num = idx + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();

            match fields.first().copied() {
                Some("r") => {
                    if let Some(entry) = current.take() {
                        entry.finish(&mut handler, &mut stats);
                    }
                    match Pending::from_router_line(&fields[1..], line_num) {
                        Ok(entry) => current = Some(entry),
                        Err(reason) => {
                            tracing::warn!("Line {}: skipping consensus entry: {}", line_num, reason);
                            stats.record(false);
                        }
                    }
                }
                Some("p") => {
                    if let Some(entry) = current.as_mut() {
                        match parse_summary(&fields[1..]) {
                            Ok(summary) => entry.exit_summary = Some(summary),
                            Err(reason) => entry.error = Some(reason),
                        }
                    }
                }
                Some("directory-footer") => {
                    if let Some(entry) = current.take() {
                        entry.finish(&mut handler, &mut stats);
                    }
                }
                _ => {}
            }
        }

        if let Some(entry) = current.take() {
            entry.finish(&mut handler, &mut stats);
        }

        Ok(stats)
    }
}

/// Decode a base64 identity into an upper-case hex fingerprint.
fn identity_to_fingerprint(identity: &str) -> std::result::Result<String, String> {
    let bytes = STANDARD_NO_PAD
        .decode(identity.trim_end_matches('='))
        .map_err(|e| format!("invalid identity '{identity}': {e}"))?;
    if bytes.len() != IDENTITY_LEN {
        return Err(format!(
            "identity '{identity}' decodes to {} bytes, expected {IDENTITY_LEN}",
            bytes.len()
        ));
    }
    Ok(hex::encode_upper(bytes))
}

/// Parse the arguments of a `p` line.
fn parse_summary(args: &[&str]) -> std::result::Result<ExitSummary, String> {
    let (keyword, portlist) = match args {
        [keyword] => (*keyword, None),
        [keyword, portlist] => (*keyword, Some(*portlist)),
        _ => return Err(format!("'p' line has {} arguments", args.len())),
    };

    let ranges = portlist
        .map(|list| {
            list.split(',')
                .map(parse_port_range)
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    match keyword {
        "accept" => Ok(ExitSummary::accept(ranges)),
        "reject" => Ok(ExitSummary::reject(ranges)),
        other => Err(format!("unknown policy keyword '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // 20 bytes 0x00..0x13
    const IDENTITY: &str = "AAECAwQFBgcICQoLDA0ODxAREhM";
    const FINGERPRINT: &str = "000102030405060708090A0B0C0D0E0F10111213";

    fn parse_all(doc: &str) -> (Vec<ConsensusEntry>, ParseStats) {
        let mut entries = Vec::new();
        let stats = ConsensusParser
            .parse(Cursor::new(doc), |e| entries.push(e))
            .unwrap();
        (entries, stats)
    }

    #[test]
    fn test_identity_to_fingerprint() {
        assert_eq!(identity_to_fingerprint(IDENTITY).unwrap(), FINGERPRINT);
        assert_eq!(
            identity_to_fingerprint(&format!("{IDENTITY}=")).unwrap(),
            FINGERPRINT
        );
        assert!(identity_to_fingerprint("AAEC").is_err());
        assert!(identity_to_fingerprint("!!!").is_err());
    }

    #[test]
    fn test_parse_full_consensus_entries() {
        let doc = format!(
            "network-status-version 3\n\
             r relayA {IDENTITY} digestdigestdigestdigestdig 2014-03-27 04:12:33 1.2.3.4 9001 0\n\
             s Exit Fast Running Valid\n\
             p accept 80,443,6660-6669\n\
             r relayB {IDENTITY} digestdigestdigestdigestdig 2014-03-27 04:12:33 5.6.7.8 443 80\n\
             s Fast Running\n\
             p reject 1-65535\n\
             directory-footer\n\
             bandwidth-weights Wbd=0\n"
        );
        let (entries, stats) = parse_all(&doc);

        assert_eq!(stats.entries_parsed, 2);
        assert_eq!(entries[0].fingerprint, FINGERPRINT);
        assert_eq!(entries[0].address, "1.2.3.4");

        let summary = entries[0].exit_summary.as_ref().unwrap();
        assert!(!summary.default_allowed);
        assert_eq!(summary.segments.len(), 3);
        assert_eq!(summary.segments[2].min_port, 6660);
        assert_eq!(summary.segments[2].max_port, 6669);

        let summary = entries[1].exit_summary.as_ref().unwrap();
        assert!(summary.default_allowed);
        assert!(!summary.is_exiting_allowed());
    }

    #[test]
    fn test_parse_microdesc_router_line() {
        let doc = format!("r relayA {IDENTITY} 2014-03-27 04:12:33 9.8.7.6 9001 0\np reject 25\n");
        let (entries, _) = parse_all(&doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "9.8.7.6");
    }

    #[test]
    fn test_entry_without_policy_line() {
        let doc = format!("r relayA {IDENTITY} 2014-03-27 04:12:33 9.8.7.6 9001 0\ns Fast\n");
        let (entries, _) = parse_all(&doc);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].exit_summary.is_none());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let doc = format!(
            "r short line\n\
             p accept 80\n\
             r relayB {IDENTITY} 2014-03-27 04:12:33 5.6.7.8 443 80\n\
             p accept 80-70\n\
             r relayC {IDENTITY} 2014-03-27 04:12:33 not.an.ip 443 80\n\
             r relayD {IDENTITY} 2014-03-27 04:12:33 5.6.7.9 443 80\n\
             p accept 443\n"
        );
        let (entries, stats) = parse_all(&doc);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "5.6.7.9");
        assert_eq!(stats.entries_seen, 4);
        assert_eq!(stats.entries_skipped, 3);
    }

    #[test]
    fn test_parse_summary_variants() {
        let summary = parse_summary(&["reject"]).unwrap();
        assert!(summary.default_allowed);
        assert!(summary.segments.is_empty());

        assert!(parse_summary(&["allow", "80"]).is_err());
        assert!(parse_summary(&[]).is_err());
    }
}
