//! Error types shared by the exitfuse crates.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or evaluating relay records.
#[derive(Error, Debug)]
pub enum Error {
    /// A prefix length is longer than the address family allows.
    #[error("invalid prefix length /{bits} for {family} address")]
    InvalidPrefix {
        /// Address family the prefix was applied to.
        family: &'static str,
        /// The rejected prefix length.
        bits: u8,
    },

    /// A port range whose lower bound exceeds its upper bound.
    #[error("invalid port range {min}-{max}")]
    InvalidPortRange {
        /// Lower bound.
        min: u16,
        /// Upper bound.
        max: u16,
    },

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
