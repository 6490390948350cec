//! Snapshot document parsers.
//!
//! Each snapshot kind is read through the [`DocumentParser`] trait, which
//! exposes only the fields the fusion stages need. The stages never see the
//! native document grammar, so they can be driven from synthetic entries in
//! tests.
//!
//! # Available Parsers
//!
//! - [`ConsensusParser`] - network status consensus documents
//! - [`ExitListParser`] - exit address lists (`ExitNode` / `ExitAddress`)
//! - [`DescriptorParser`] - concatenated relay server descriptors
//!
//! Malformed entries are logged and skipped; only I/O errors end a file.

mod consensus;
mod descriptor;
mod exit_list;

pub use consensus::ConsensusParser;
pub use descriptor::DescriptorParser;
pub use exit_list::ExitListParser;

use crate::Result;
use chrono::{DateTime, Utc};
use exitfuse_core::{ExitSummary, MAX_PORT, NativeRule};
use std::io::BufRead;

/// A reader for one kind of snapshot document.
pub trait DocumentParser {
    /// Structured entry produced for each relay in the document.
    type Entry;

    /// Human-readable name for this source (used in logs and metrics).
    fn name(&self) -> &'static str;

    /// Parse a document, calling `handler` for each well-formed entry.
    ///
    /// Returns statistics about the entries seen. An `Err` means the
    /// underlying reader failed; entries already handed out remain valid.
    fn parse<R, F>(&self, reader: R, handler: F) -> Result<ParseStats>
    where
        R: BufRead,
        F: FnMut(Self::Entry);
}

/// Statistics from parsing one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Entries encountered, well-formed or not.
    pub entries_seen: usize,

    /// Entries handed to the handler.
    pub entries_parsed: usize,

    /// Malformed entries that were skipped.
    pub entries_skipped: usize,
}

impl ParseStats {
    fn record(&mut self, ok: bool) {
        self.entries_seen += 1;
        if ok {
            self.entries_parsed += 1;
        } else {
            self.entries_skipped += 1;
        }
    }
}

/// One relay entry from a consensus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusEntry {
    /// Upper-case hex identity fingerprint.
    pub fingerprint: String,

    /// Address the relay reports for itself.
    pub address: String,

    /// Exit-permission summary; `None` when the entry carries none.
    pub exit_summary: Option<ExitSummary>,
}

/// One externally observed exit address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub address: String,
    pub observed_at: DateTime<Utc>,
}

/// All observations of one relay in an exit-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitListEntry {
    pub fingerprint: String,

    /// Observations in document order.
    pub observations: Vec<Observation>,
}

/// A relay's self-published exit policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorEntry {
    pub fingerprint: String,

    /// Publication time, when the descriptor states one.
    pub published: Option<DateTime<Utc>>,

    /// Exit policy rules in document order.
    pub rules: Vec<NativeRule>,
}

/// Parse `n` or `n-m` into an inclusive range.
pub(crate) fn parse_port_range(spec: &str) -> std::result::Result<(u16, u16), String> {
    let parse = |s: &str| {
        s.parse::<u16>()
            .map_err(|e| format!("invalid port '{s}': {e}"))
    };

    let (min, max) = match spec.split_once('-') {
        Some((lo, hi)) => (parse(lo)?, parse(hi)?),
        None => {
            let port = parse(spec)?;
            (port, port)
        }
    };

    if min > max {
        return Err(format!("inverted port range '{spec}'"));
    }
    Ok((min, max))
}

/// Parse a port spec that may also be `*` (every port).
pub(crate) fn parse_port_spec(spec: &str) -> std::result::Result<(u16, u16), String> {
    if spec == "*" {
        Ok((1, MAX_PORT))
    } else {
        parse_port_range(spec)
    }
}

/// Normalise a 40-character hex fingerprint to upper case.
pub(crate) fn normalize_fingerprint(raw: &str) -> std::result::Result<String, String> {
    let fp = raw.trim_start_matches('$');
    if fp.len() != 40 || !fp.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid fingerprint '{raw}'"));
    }
    Ok(fp.to_ascii_uppercase())
}
