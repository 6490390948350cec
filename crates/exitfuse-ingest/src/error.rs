//! Error types for the fusion pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading snapshots or writing the table.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error not tied to a particular snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading a snapshot file or directory failed.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot filename does not carry a parsable timestamp.
    #[error("invalid snapshot name '{name}': {reason}")]
    SnapshotName { name: String, reason: String },

    /// A malformed line in a file whose format admits no partial recovery.
    #[error("{}:{line}: {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Writing the output table failed.
    #[error("cannot write output {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record model error.
    #[error(transparent)]
    Core(#[from] exitfuse_core::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_names_file() {
        let err = Error::Read {
            path: PathBuf::from("data/consensuses/2014-03-27-05-00-00-consensus"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("2014-03-27-05-00-00-consensus"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_malformed_error_names_line() {
        let err = Error::Malformed {
            path: PathBuf::from("exit-policies"),
            line: 7,
            reason: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "exit-policies:7: expected value");
    }

    #[test]
    fn test_output_error_display() {
        let err = Error::Output {
            path: PathBuf::from("/ro/exit-policies"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert!(err.to_string().starts_with("cannot write output /ro/exit-policies"));
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: Error = exitfuse_core::Error::InvalidPortRange { min: 9, max: 1 }.into();
        assert_eq!(err.to_string(), "invalid port range 9-1");
    }
}
