//! Exit policy table builder.
//!
//! This crate fuses three kinds of relay network snapshots into one
//! JSON-lines table describing, for every exit relay, its best-known
//! external address and its effective exit policy.
//!
//! # Modules
//!
//! - [`bucket`] - Snapshot timestamps and hours-ago buckets
//! - [`source`] - Document parsers (consensus, exit-list, descriptor)
//! - [`snapshot`] - Snapshot discovery and parallel loading
//! - [`pipeline`] - Fusion stages (baseline, reconcile, override, emit)
//! - [`runner`] - One complete run over a data directory
//! - [`lookup`] - Queries over an emitted table
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Consensuses   │  newest first, one bucket each
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Baseline     │  first exit-permitted sighting wins
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Reconcile    │  exit-list addresses, same bucket only
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Policy override │  descriptor rules replace provisional ones
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Emit       │  JSON lines, staged then renamed
//! └─────────────────┘
//! ```
//!
//! Parsing fans out across files; the fusion stages run sequentially.

pub mod bucket;
pub mod config;
pub mod error;
pub mod lookup;
pub mod pipeline;
pub mod runner;
pub mod snapshot;
pub mod source;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use config::{Config, MatchGranularity};
pub use lookup::{DEFAULT_MAX_AGE_HOURS, ExitIndex};
pub use pipeline::RecordSet;
pub use runner::{RunSummary, run};

// Re-export parser trait and entry types
pub use source::{
    ConsensusEntry, ConsensusParser, DescriptorEntry, DescriptorParser, DocumentParser,
    ExitListEntry, ExitListParser, Observation, ParseStats,
};
