//! Fusion stages over the owned record set.
//!
//! - [`baseline`] - admits exit relays from consensus snapshots, newest first
//! - [`reconcile`] - corrects addresses from exit-list observations
//! - [`policy_override`] - replaces provisional rules with descriptor policies
//! - [`emit`] - writes the table as JSON lines
//!
//! # Architecture
//!
//! ```text
//! consensuses ──► baseline ──► reconcile ──► policy_override ──► emit
//!                    │             ▲               ▲
//!                    ▼             │               │
//!                RecordSet    exit-lists      descriptors
//! ```
//!
//! Every stage mutates the same [`RecordSet`] sequentially.

pub mod baseline;
pub mod emit;
pub mod policy_override;
pub mod reconcile;
mod records;

pub use baseline::{BaselineStats, ingest_snapshot};
pub use emit::{emit_to_path, write_records};
pub use policy_override::{
    DESCRIPTOR_DEFAULT_ALLOWED, OverrideStats, apply_descriptors, latest_descriptors,
};
pub use reconcile::{ReconcileStats, latest_observation, reconcile_bucket, select_exit_list};
pub use records::RecordSet;
