//! JSON-lines output of the record set.

use super::RecordSet;
use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write one JSON object per record, newline terminated.
pub fn write_records<W: Write>(records: &RecordSet, mut writer: W) -> Result<usize> {
    let mut written = 0;
    for record in records.iter() {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Sibling path the table is staged in before the final rename.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with the serialized record set.
///
/// Returns the number of records written. Readers of `path` see either the
/// previous table or the new one, never a partial file.
pub fn emit_to_path(records: &RecordSet, path: &Path) -> Result<usize> {
    let staging = staging_path(path);
    let output_error = |source: io::Error| Error::Output {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(&staging).map_err(output_error)?;
    let mut writer = BufWriter::new(file);
    let written = write_records(records, &mut writer).map_err(|e| match e {
        Error::Io(source) => output_error(source),
        Error::Json(e) => output_error(io::Error::other(e)),
        other => other,
    })?;

    let file = writer
        .into_inner()
        .map_err(|e| output_error(e.into_error()))?;
    file.sync_all().map_err(output_error)?;
    drop(file);

    if let Err(e) = fs::rename(&staging, path) {
        if let Err(cleanup) = fs::remove_file(&staging) {
            tracing::warn!("Failed to remove {}: {}", staging.display(), cleanup);
        }
        return Err(output_error(e));
    }

    tracing::info!("Wrote {} records to {}", written, path.display());
    Ok(written)
}
