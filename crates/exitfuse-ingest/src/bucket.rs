//! Snapshot timestamps and hours-ago buckets.
//!
//! Snapshot files carry their as-of time in the name:
//!
//! ```text
//! consensuses/2014-03-27-05-00-00-consensus
//! exit-lists/2014-03-27-05-02-02
//! ```
//!
//! The embedded time is always UTC. A bucket is the number of whole hours
//! between "now" and that time, floored, so bucket `n` holds snapshots that
//! are at least `n` and less than `n + 1` hours old.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use exitfuse_core::Bucket;

/// Suffix identifying a consensus snapshot file.
pub const CONSENSUS_SUFFIX: &str = "-consensus";

/// Timestamp layout embedded in snapshot names.
const STAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Length of a rendered [`STAMP_FORMAT`] timestamp.
const STAMP_LEN: usize = 19;

const SECONDS_PER_HOUR: i64 = 3600;

/// A timestamp taken from a snapshot filename.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotStamp {
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,

    /// Canonical `YYYY-MM-DD-HH-MM-SS` rendering of `taken_at`.
    stamp: String,
}

impl SnapshotStamp {
    /// Parse a bare `YYYY-MM-DD-HH-MM-SS` timestamp.
    pub fn parse(text: &str) -> Result<Self> {
        let naive =
            NaiveDateTime::parse_from_str(text, STAMP_FORMAT).map_err(|e| Error::SnapshotName {
                name: text.to_string(),
                reason: e.to_string(),
            })?;
        let taken_at = naive.and_utc();
        Ok(Self {
            stamp: taken_at.format(STAMP_FORMAT).to_string(),
            taken_at,
        })
    }

    /// Parse a consensus filename (`<stamp>-consensus`).
    pub fn from_consensus_name(name: &str) -> Result<Self> {
        let stamp = name
            .strip_suffix(CONSENSUS_SUFFIX)
            .ok_or_else(|| Error::SnapshotName {
                name: name.to_string(),
                reason: format!("missing '{CONSENSUS_SUFFIX}' suffix"),
            })?;
        Self::parse(stamp).map_err(|e| rename(e, name))
    }

    /// Parse an exit-list filename, which starts with a timestamp.
    pub fn from_exit_list_name(name: &str) -> Result<Self> {
        let stamp = name.get(..STAMP_LEN).ok_or_else(|| Error::SnapshotName {
            name: name.to_string(),
            reason: "too short to hold a timestamp".to_string(),
        })?;
        Self::parse(stamp).map_err(|e| rename(e, name))
    }

    /// The canonical timestamp text.
    pub fn as_str(&self) -> &str {
        &self.stamp
    }

    /// `YYYY-MM-DD`.
    pub fn day_prefix(&self) -> &str {
        &self.stamp[..10]
    }

    /// `YYYY-MM-DD-HH`.
    pub fn hour_prefix(&self) -> &str {
        &self.stamp[..13]
    }

    /// Hours-ago bucket of this snapshot relative to `now`.
    pub fn bucket(&self, now: DateTime<Utc>) -> Bucket {
        hours_ago(self.taken_at, now)
    }
}

/// Whole hours from `taken_at` to `now`, floored.
///
/// Snapshots from the future land in negative buckets.
pub fn hours_ago(taken_at: DateTime<Utc>, now: DateTime<Utc>) -> Bucket {
    (now - taken_at).num_seconds().div_euclid(SECONDS_PER_HOUR)
}

/// Bucket of a consensus snapshot from its filename.
pub fn bucket_for(name: &str, now: DateTime<Utc>) -> Result<Bucket> {
    Ok(SnapshotStamp::from_consensus_name(name)?.bucket(now))
}

/// Report the full filename rather than the stripped timestamp.
fn rename(err: Error, name: &str) -> Error {
    match err {
        Error::SnapshotName { reason, .. } => Error::SnapshotName {
            name: name.to_string(),
            reason,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_consensus_name() {
        let stamp = SnapshotStamp::from_consensus_name("2014-03-27-05-00-00-consensus").unwrap();
        assert_eq!(stamp.taken_at, at(2014, 3, 27, 5, 0, 0));
        assert_eq!(stamp.as_str(), "2014-03-27-05-00-00");
        assert_eq!(stamp.day_prefix(), "2014-03-27");
        assert_eq!(stamp.hour_prefix(), "2014-03-27-05");
    }

    #[test]
    fn test_parse_exit_list_name() {
        let stamp = SnapshotStamp::from_exit_list_name("2014-03-27-05-02-02").unwrap();
        assert_eq!(stamp.taken_at, at(2014, 3, 27, 5, 2, 2));
    }

    #[test]
    fn test_missing_suffix_is_an_error() {
        let err = SnapshotStamp::from_consensus_name("2014-03-27-05-00-00").unwrap_err();
        assert!(matches!(err, Error::SnapshotName { .. }));
    }

    #[test]
    fn test_unparsable_timestamp_names_the_file() {
        let err = bucket_for("2014-13-40-05-00-00-consensus", Utc::now()).unwrap_err();
        assert!(err.to_string().contains("2014-13-40-05-00-00-consensus"));
    }

    #[test]
    fn test_exit_list_name_too_short() {
        assert!(SnapshotStamp::from_exit_list_name("2014-03-27").is_err());
    }

    #[test]
    fn test_bucket_floors_into_half_open_hours() {
        let taken = at(2014, 3, 27, 5, 0, 0);
        assert_eq!(hours_ago(taken, taken), 0);
        assert_eq!(hours_ago(taken, taken + Duration::minutes(59)), 0);
        assert_eq!(hours_ago(taken, taken + Duration::minutes(60)), 1);
        assert_eq!(hours_ago(taken, taken + Duration::minutes(61)), 1);
        assert_eq!(hours_ago(taken, taken + Duration::minutes(65)), 1);
        assert_eq!(hours_ago(taken, taken + Duration::minutes(119)), 1);
        assert_eq!(hours_ago(taken, taken + Duration::minutes(120)), 2);
    }

    #[test]
    fn test_future_snapshot_floors_negative() {
        let taken = at(2014, 3, 27, 5, 0, 0);
        assert_eq!(hours_ago(taken, taken - Duration::minutes(1)), -1);
        assert_eq!(hours_ago(taken, taken - Duration::minutes(60)), -1);
        assert_eq!(hours_ago(taken, taken - Duration::minutes(61)), -2);
    }

    #[test]
    fn test_bucket_for_uses_utc() {
        let now = at(2014, 3, 27, 8, 30, 0);
        assert_eq!(bucket_for("2014-03-27-05-00-00-consensus", now).unwrap(), 3);
        assert_eq!(bucket_for("2014-03-27-08-00-00-consensus", now).unwrap(), 0);
    }
}
