//! Core types and shared utilities for the exitfuse relay exit table.
//!
//! This crate provides:
//! - The emitted record model ([`RelayRecord`], [`PolicyRule`])
//! - The coarse consensus exit summary and its provisional rules
//! - Native descriptor rules and their translation into emitted rules
//! - Exit policy evaluation against a target address and port
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
mod native;
pub mod metrics;
mod policy;
mod record;
mod summary;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Highest port number a policy rule can name.
pub const MAX_PORT: u16 = 65535;

/// Target used to decide whether an address "is an exit" when no explicit
/// target is given.
pub const DEFAULT_TARGET_ADDRESS: &str = "38.229.70.31";

/// Port paired with [`DEFAULT_TARGET_ADDRESS`].
pub const DEFAULT_TARGET_PORT: u16 = 443;

pub use error::{Error, Result};
pub use native::{AddressFamily, AddressPattern, NativeRule, netmask};
pub use policy::ExitPolicy;
pub use record::{Bucket, PolicyRule, RelayRecord};
pub use summary::{ExitSummary, PortSegment};
