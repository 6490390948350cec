//! Prometheus metrics helpers for exitfuse.
//!
//! # Usage
//!
//! ```rust,ignore
//! use exitfuse_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9092, handle).await.unwrap();
//!
//!     metrics::counter!("exitfuse_relays_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: `exitfuse_`
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: only `source` (consensus, exit_list, descriptor) where useful

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_common_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server.
///
/// Binds the listener before returning so that an unusable port is reported
/// to the caller, then serves `/metrics` from a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::warn!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the metrics recorded by the pipeline.
fn register_common_metrics() {
    // =========================================================================
    // Snapshot loading
    // =========================================================================

    describe_counter!(
        "exitfuse_snapshot_files_total",
        "Snapshot files loaded (label: source)"
    );
    describe_counter!(
        "exitfuse_files_skipped_total",
        "Snapshot files skipped because of a bad name or read error (label: source)"
    );
    describe_counter!(
        "exitfuse_entries_skipped_total",
        "Malformed document entries skipped (label: source)"
    );
    describe_histogram!(
        "exitfuse_load_duration_seconds",
        "Time spent loading and parsing snapshot files"
    );

    // =========================================================================
    // Fusion stages
    // =========================================================================

    describe_gauge!("exitfuse_relays_total", "Exit relays in the record set");
    describe_counter!(
        "exitfuse_addresses_reconciled_total",
        "Relay addresses replaced from exit-list observations"
    );
    describe_counter!(
        "exitfuse_policies_overridden_total",
        "Relay rule lists replaced from descriptors"
    );
    describe_gauge!(
        "exitfuse_run_running",
        "Whether a fusion run is in progress (1=yes, 0=no)"
    );
}

// =============================================================================
// Metric Recording Helpers
// =============================================================================

/// Increment a counter labelled with the snapshot source it concerns.
#[inline]
pub fn increment_for_source(name: &'static str, source: &'static str, count: u64) {
    metrics::counter!(name, "source" => source).increment(count);
}

/// Increment an unlabelled counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
