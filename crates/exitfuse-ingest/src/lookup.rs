//! Queries over an emitted exit policy table.
//!
//! An [`ExitIndex`] loads the JSON-lines table and answers which relay
//! addresses can reach a given target. It backs the bulk exit list tool.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use exitfuse_core::{
    Bucket, DEFAULT_TARGET_ADDRESS, DEFAULT_TARGET_PORT, ExitPolicy, RelayRecord,
};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::IpAddr;
use std::path::Path;

/// Records older than this many hours are not offered as exits.
pub const DEFAULT_MAX_AGE_HOURS: Bucket = 16;

/// `time.UnixDate`-style rendering used in the bulk list header.
const HEADER_TIME_FORMAT: &str = "%a %b %e %H:%M:%S UTC %Y";

#[derive(Debug, Clone)]
struct IndexedRelay {
    address: String,
    age_bucket: Bucket,
    policy: ExitPolicy,
}

/// Compiled exit policies of every relay in a table.
#[derive(Debug, Clone)]
pub struct ExitIndex {
    relays: Vec<IndexedRelay>,
    default_exits: BTreeSet<String>,
    loaded_at: DateTime<Utc>,
}

impl ExitIndex {
    /// Build an index from table records.
    pub fn from_records(records: impl IntoIterator<Item = RelayRecord>) -> Self {
        let relays = records
            .into_iter()
            .map(|record| IndexedRelay {
                policy: ExitPolicy::for_record(&record),
                address: record.address,
                age_bucket: record.age_bucket,
            })
            .collect();

        let mut index = Self {
            relays,
            default_exits: BTreeSet::new(),
            loaded_at: Utc::now(),
        };
        index.default_exits = match DEFAULT_TARGET_ADDRESS.parse::<IpAddr>() {
            Ok(target) => index.allowed_exits(target, DEFAULT_TARGET_PORT, DEFAULT_MAX_AGE_HOURS),
            Err(_) => BTreeSet::new(),
        };
        index
    }

    /// Load a table from `reader`. `origin` names the source in errors.
    ///
    /// Blank lines are ignored; any other line that is not a record fails
    /// the whole load.
    pub fn from_reader<R: BufRead>(reader: R, origin: &Path) -> Result<Self> {
        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| Error::Read {
                path: origin.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RelayRecord =
                serde_json::from_str(&line).map_err(|e| Error::Malformed {
                    path: origin.to_path_buf(),
                    line: idx + 1,
                    reason: e.to_string(),
                })?;
            records.push(record);
        }

        tracing::info!("Loaded {} exit policies from {}", records.len(), origin.display());
        Ok(Self::from_records(records))
    }

    /// Load a table file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file), path)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// When this index was built.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Addresses of relays at most `max_age_hours` old that allow `ip:port`.
    pub fn allowed_exits(&self, ip: IpAddr, port: u16, max_age_hours: Bucket) -> BTreeSet<String> {
        self.relays
            .iter()
            .filter(|r| r.age_bucket <= max_age_hours)
            .filter(|r| r.policy.allows(ip, port))
            .map(|r| r.address.clone())
            .collect()
    }

    /// Render the bulk exit list for `ip:port`.
    pub fn write_bulk_list<W: Write>(
        &self,
        mut writer: W,
        ip: IpAddr,
        port: u16,
        max_age_hours: Bucket,
    ) -> io::Result<()> {
        writeln!(
            writer,
            "# This is a list of all Tor exit nodes that can contact {ip} on Port {port} #"
        )?;
        writeln!(
            writer,
            "# You can update this list by visiting \
             https://check.torproject.org/cgi-bin/TorBulkExitList.py?ip={ip}&port={port} #"
        )?;
        writeln!(
            writer,
            "# This file was generated on {} #",
            self.loaded_at.format(HEADER_TIME_FORMAT)
        )?;
        for address in self.allowed_exits(ip, port, max_age_hours) {
            writeln!(writer, "{address}")?;
        }
        writer.flush()
    }

    /// Whether `address` can exit to the default target.
    pub fn is_exit(&self, address: &str) -> bool {
        self.default_exits.contains(address.trim())
    }
}
