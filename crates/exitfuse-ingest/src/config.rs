//! Run configuration loaded from environment variables.
//!
//! Command-line flags in the binaries override whatever is loaded here.

use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How much of a consensus timestamp an exit-list name must share to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MatchGranularity {
    /// Same calendar day (`YYYY-MM-DD`).
    #[default]
    Day,
    /// Same day and hour (`YYYY-MM-DD-HH`).
    Hour,
}

impl FromStr for MatchGranularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "hour" => Ok(Self::Hour),
            other => Err(Error::Config(format!(
                "exit-list match must be 'day' or 'hour', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MatchGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Day => "day",
            Self::Hour => "hour",
        })
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of `*-consensus` snapshot files.
    pub consensus_dir: PathBuf,

    /// Directory of exit-list snapshot files.
    pub exit_list_dir: PathBuf,

    /// Descriptor file, or directory of descriptor files.
    pub descriptors: PathBuf,

    /// Output path for the exit policy table.
    pub output: PathBuf,

    /// Process only this many of the most recent consensus snapshots.
    pub limit: Option<usize>,

    /// Prefix length used to pair exit-lists with consensuses.
    pub exit_list_match: MatchGranularity,

    /// Worker threads used to parse snapshot files.
    pub workers: usize,
}

impl Config {
    /// Default layout under one data directory.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            consensus_dir: data_dir.join("consensuses"),
            exit_list_dir: data_dir.join("exit-lists"),
            descriptors: data_dir.join("cached-descriptors"),
            output: data_dir.join("exit-policies"),
            limit: None,
            exit_list_match: MatchGranularity::default(),
            workers: num_cpus::get(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `EXITFUSE_DATA_DIR`: Base directory for inputs and output (default: "./data")
    /// - `EXITFUSE_EXIT_LIST_MATCH`: `day` or `hour` (default: "day")
    /// - `EXITFUSE_WORKERS`: Parser threads (default: number of CPUs)
    pub fn from_env() -> Result<Self> {
        let data_dir =
            std::env::var("EXITFUSE_DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let mut config = Self::with_data_dir(&data_dir);

        if let Ok(value) = std::env::var("EXITFUSE_EXIT_LIST_MATCH") {
            config.exit_list_match = value.parse()?;
        }

        if let Ok(value) = std::env::var("EXITFUSE_WORKERS") {
            config.workers = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(Error::Config(format!(
                        "EXITFUSE_WORKERS must be a positive integer, got '{value}'"
                    )));
                }
            };
        }

        tracing::info!(
            data_dir = %data_dir,
            exit_list_match = %config.exit_list_match,
            workers = config.workers,
            "configuration loaded"
        );

        Ok(config)
    }
}
