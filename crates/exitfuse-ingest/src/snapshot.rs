//! Snapshot discovery and parallel loading.
//!
//! Discovery turns the input directories into ordered file lists. Loading
//! parses whole files through a [`DocumentParser`], fanning independent
//! files out over a small worker pool. Results come back in input order so
//! the fusion stages stay deterministic.

use crate::bucket::{CONSENSUS_SUFFIX, SnapshotStamp};
use crate::source::{DocumentParser, ParseStats};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use exitfuse_core::Bucket;
use exitfuse_core::metrics::increment_for_source;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A consensus snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusFile {
    pub path: PathBuf,
    pub stamp: SnapshotStamp,
    pub bucket: Bucket,
}

/// An exit-list snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitListFile {
    pub path: PathBuf,
    pub stamp: SnapshotStamp,
}

impl ExitListFile {
    /// The filename, used for tie-breaking between candidates.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Regular files directly inside `dir` as `(path, name)` pairs.
fn list_files(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let entries = fs::read_dir(dir).map_err(|source| Error::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some((path, name))
        })
        .collect();

    // Sort for deterministic processing order
    files.sort();
    Ok(files)
}

/// Find consensus snapshots in `dir`, newest first.
///
/// Files without the `-consensus` suffix are ignored; files with the suffix
/// but an unparsable timestamp are skipped with a warning. `limit` keeps
/// only the most recent snapshots.
pub fn discover_consensuses(
    dir: &Path,
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Result<Vec<ConsensusFile>> {
    let mut found = Vec::new();

    for (path, name) in list_files(dir)? {
        if !name.ends_with(CONSENSUS_SUFFIX) {
            tracing::debug!("Ignoring non-consensus file {}", path.display());
            continue;
        }
        match SnapshotStamp::from_consensus_name(&name) {
            Ok(stamp) => found.push(ConsensusFile {
                bucket: stamp.bucket(now),
                stamp,
                path,
            }),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                increment_for_source("exitfuse_files_skipped_total", "consensus", 1);
            }
        }
    }

    found.sort_by(|a, b| b.stamp.cmp(&a.stamp).then_with(|| b.path.cmp(&a.path)));

    if let Some(limit) = limit {
        found.truncate(limit);
    }

    Ok(found)
}

/// Find exit-list snapshots in `dir`, sorted by name.
///
/// A missing directory yields no exit-lists: reconciliation is optional.
pub fn discover_exit_lists(dir: &Path) -> Result<Vec<ExitListFile>> {
    if !dir.exists() {
        tracing::warn!(
            "Exit-list directory {} does not exist; addresses will not be reconciled",
            dir.display()
        );
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for (path, name) in list_files(dir)? {
        match SnapshotStamp::from_exit_list_name(&name) {
            Ok(stamp) => found.push(ExitListFile { path, stamp }),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                increment_for_source("exitfuse_files_skipped_total", "exit_list", 1);
            }
        }
    }
    Ok(found)
}

/// Descriptor input: a single file, or every file in a directory by name.
///
/// A missing path yields no descriptors: the provisional rules stand.
pub fn discover_descriptor_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        Ok(vec![path.to_path_buf()])
    } else if path.is_dir() {
        Ok(list_files(path)?.into_iter().map(|(p, _)| p).collect())
    } else {
        tracing::warn!(
            "Descriptor path {} does not exist; policies will not be overridden",
            path.display()
        );
        Ok(Vec::new())
    }
}

/// Entries parsed from one file.
#[derive(Debug)]
pub struct Loaded<E> {
    pub path: PathBuf,
    pub entries: Vec<E>,
    pub stats: ParseStats,
}

/// Parse one file completely.
pub fn load_file<P: DocumentParser>(parser: &P, path: &Path) -> Result<Loaded<P::Entry>> {
    let start = Instant::now();
    let read_error = |source| Error::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_error)?;
    let mut entries = Vec::new();
    let stats = parser
        .parse(BufReader::new(file), |entry| entries.push(entry))
        .map_err(|e| match e {
            Error::Io(source) => read_error(source),
            other => other,
        })?;

    metrics::histogram!("exitfuse_load_duration_seconds").record(start.elapsed().as_secs_f64());
    increment_for_source("exitfuse_snapshot_files_total", parser.name(), 1);
    increment_for_source(
        "exitfuse_entries_skipped_total",
        parser.name(),
        stats.entries_skipped as u64,
    );

    tracing::info!(
        source = parser.name(),
        entries = stats.entries_parsed,
        skipped = stats.entries_skipped,
        "Loaded {}",
        path.display()
    );

    Ok(Loaded {
        path: path.to_path_buf(),
        entries,
        stats,
    })
}

/// Parse many files on up to `workers` threads.
///
/// The result has one slot per input path, in input order. A file that
/// fails to load is logged and its slot is `None`.
pub fn load_all<P>(parser: &P, paths: &[PathBuf], workers: usize) -> Vec<Option<Loaded<P::Entry>>>
where
    P: DocumentParser + Sync,
    P::Entry: Send,
{
    let workers = workers.clamp(1, paths.len().max(1));
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &Path)>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded();

    for (idx, path) in paths.iter().enumerate() {
        if job_tx.send((idx, path.as_path())).is_err() {
            break;
        }
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (idx, path) in job_rx.iter() {
                    let loaded = match load_file(parser, path) {
                        Ok(loaded) => Some(loaded),
                        Err(e) => {
                            tracing::warn!("Skipping {}: {}", path.display(), e);
                            increment_for_source("exitfuse_files_skipped_total", parser.name(), 1);
                            None
                        }
                    };
                    if result_tx.send((idx, loaded)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut results: Vec<Option<Loaded<P::Entry>>> = (0..paths.len()).map(|_| None).collect();
    for (idx, loaded) in result_rx.iter() {
        results[idx] = loaded;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ExitListParser;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const FP: &str = "0011BD2485AD45D984EC4159C88FC066E5E3300E";

    fn touch(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 3, 27, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_discover_consensuses_newest_first() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2014-03-27-05-00-00-consensus", "");
        touch(tmp.path(), "2014-03-27-08-00-00-consensus", "");
        touch(tmp.path(), "2014-03-27-07-00-00-consensus", "");
        touch(tmp.path(), "README", "");
        touch(tmp.path(), "2014-99-27-07-00-00-consensus", "");
        fs::create_dir(tmp.path().join("2014-03-27-09-00-00-consensus")).unwrap();

        let found = discover_consensuses(tmp.path(), now(), None).unwrap();
        let buckets: Vec<_> = found.iter().map(|f| f.bucket).collect();
        assert_eq!(buckets, vec![0, 1, 3]);
        assert_eq!(found[0].stamp.as_str(), "2014-03-27-08-00-00");
    }

    #[test]
    fn test_discover_consensuses_limit() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2014-03-27-05-00-00-consensus", "");
        touch(tmp.path(), "2014-03-27-08-00-00-consensus", "");
        touch(tmp.path(), "2014-03-27-07-00-00-consensus", "");

        let found = discover_consensuses(tmp.path(), now(), Some(2)).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].stamp.as_str(), "2014-03-27-07-00-00");
    }

    #[test]
    fn test_discover_consensuses_missing_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = discover_consensuses(&tmp.path().join("nope"), now(), None).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn test_discover_exit_lists() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2014-03-27-05-02-02", "");
        touch(tmp.path(), "notes.txt", "");

        let found = discover_exit_lists(tmp.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name(), "2014-03-27-05-02-02");

        assert!(discover_exit_lists(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_discover_descriptor_files() {
        let tmp = TempDir::new().unwrap();
        let b = touch(tmp.path(), "b", "");
        let a = touch(tmp.path(), "a", "");

        assert_eq!(discover_descriptor_files(tmp.path()).unwrap(), vec![a.clone(), b]);
        assert_eq!(discover_descriptor_files(&a).unwrap(), vec![a]);
        assert!(
            discover_descriptor_files(&tmp.path().join("nope"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_load_all_preserves_order_and_skips_failures() {
        let tmp = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for hour in 0..6 {
            paths.push(touch(
                tmp.path(),
                &format!("2014-03-27-0{hour}-00-00"),
                &format!("ExitNode {FP}\nExitAddress 10.0.0.{hour} 2014-03-27 0{hour}:00:00\n"),
            ));
        }
        paths.insert(2, tmp.path().join("missing"));

        let loaded = load_all(&ExitListParser, &paths, 3);
        assert_eq!(loaded.len(), 7);
        assert!(loaded[2].is_none());

        let addresses: Vec<_> = loaded
            .iter()
            .flatten()
            .map(|l| l.entries[0].observations[0].address.clone())
            .collect();
        assert_eq!(
            addresses,
            vec!["10.0.0.0", "10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]
        );
    }

    #[test]
    fn test_load_file_reports_path() {
        let tmp = TempDir::new().unwrap();
        let err = load_file(&ExitListParser, &tmp.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
