//! Exit-list parser.
//!
//! ```text
//! ExitNode 0011BD2485AD45D984EC4159C88FC066E5E3300E
//! Published 2014-03-27 04:12:33
//! LastStatus 2014-03-27 05:02:02
//! ExitAddress 162.247.72.201 2014-03-27 04:32:11
//! ExitAddress 162.247.72.202 2014-03-27 04:51:40
//! ```

use super::{DocumentParser, ExitListEntry, Observation, ParseStats, normalize_fingerprint};
use crate::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::io::BufRead;
use std::net::IpAddr;

const OBSERVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parser for exit-list documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitListParser;

struct Pending {
    line: usize,
    fingerprint: String,
    observations: Vec<Observation>,
    error: Option<String>,
}

impl Pending {
    fn finish<F>(self, handler: &mut F, stats: &mut ParseStats)
    where
        F: FnMut(ExitListEntry),
    {
        let reason = match self.error {
            Some(reason) => reason,
            None if self.observations.is_empty() => "no ExitAddress lines".to_string(),
            None => {
                stats.record(true);
                handler(ExitListEntry {
                    fingerprint: self.fingerprint,
                    observations: self.observations,
                });
                return;
            }
        };

        tracing::warn!("Line {}: skipping exit-list entry: {}", self.line, reason);
        stats.record(false);
    }
}

impl DocumentParser for ExitListParser {
    type Entry = ExitListEntry;

    fn name(&self) -> &'static str {
        "exit_list"
    }

    fn parse<R, F>(&self, reader: R, mut handler: F) -> Result<ParseStats>
    where
        R: BufRead,
        F: FnMut(ExitListEntry),
    {
        let mut stats = ParseStats::default();
        let mut current: Option<Pending> = None;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_num = idx + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();

            match fields.as_slice() {
                ["ExitNode", rest @ ..] => {
                    if let Some(entry) = current.take() {
                        entry.finish(&mut handler, &mut stats);
                    }
                    let fingerprint = match rest {
                        [fp] => normalize_fingerprint(fp),
                        _ => Err(format!("'ExitNode' line has {} arguments", rest.len())),
                    };
                    match fingerprint {
                        Ok(fingerprint) => {
                            current = Some(Pending {
                                line: line_num,
                                fingerprint,
                                observations: Vec::new(),
                                error: None,
                            })
                        }
                        Err(reason) => {
                            tracing::warn!("Line {}: skipping exit-list entry: {}", line_num, reason);
                            stats.record(false);
                        }
                    }
                }
                ["ExitAddress", rest @ ..] => {
                    if let Some(entry) = current.as_mut() {
                        match parse_observation(rest) {
                            Ok(observation) => entry.observations.push(observation),
                            Err(reason) => entry.error = Some(reason),
                        }
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

/// Parse `<address> <date> <time>`.
fn parse_observation(args: &[&str]) -> std::result::Result<Observation, String> {
    let [address, date, time] = args else {
        return Err(format!("'ExitAddress' line has {} arguments", args.len()));
    };

    address
        .parse::<IpAddr>()
        .map_err(|e| format!("invalid address '{address}': {e}"))?;

    let observed_at = parse_observed_at(date, time)?;

    Ok(Observation {
        address: address.to_string(),
        observed_at,
    })
}

fn parse_observed_at(date: &str, time: &str) -> std::result::Result<DateTime<Utc>, String> {
    let text = format!("{date} {time}");
    NaiveDateTime::parse_from_str(&text, OBSERVED_AT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{text}': {e}"))
}
