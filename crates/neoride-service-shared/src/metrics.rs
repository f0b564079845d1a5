//! Prometheus metrics for the NeoRide service.
//!
//! [`init_metrics`] installs a global recorder once at startup; the
//! `/metrics` route renders it through [`metrics_handler`]. Recording helpers
//! are safe to call without a recorder, in which case they are no-ops.
//!
//! ```no_run
//! use neoride_service_shared::metrics::{init_metrics, metrics_handler, MetricsConfig};
//! use axum::{routing::get, Router};
//!
//! let config = MetricsConfig::from_env();
//! if init_metrics(&config).is_ok() {
//!     let app: Router = Router::new().route(&config.path, get(metrics_handler));
//! }
//! ```

use std::fmt;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use neoride_lib::ReadyState;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub const ENTITY_OPERATIONS_TOTAL: &str = "neoride_entity_operations_total";
pub const ENTITY_FAILURES_TOTAL: &str = "neoride_entity_failures_total";
pub const DATABASE_READY_STATE: &str = "neoride_database_ready_state";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Latency buckets in seconds. Database calls dominate, so the range runs
/// from a cached ping up to the 10 s connect timeout.
const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static RECORDER: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Route serving the exposition text. Always starts with `/`.
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl MetricsConfig {
    /// `METRICS_ENABLED` (anything but `false` enables) and `METRICS_PATH`.
    /// A path without a leading `/` is ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("METRICS_ENABLED")
                .map(|v| !v.trim().eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.enabled),
            path: std::env::var("METRICS_PATH")
                .ok()
                .filter(|p| p.starts_with('/'))
                .unwrap_or(defaults.path),
        }
    }
}

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// [`MetricsError::Disabled`] when turned off by configuration,
/// [`MetricsError::AlreadyInitialized`] on a second call, and
/// [`MetricsError::InstallFailed`] when the exporter rejects its setup.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Err(MetricsError::Disabled);
    }
    if RECORDER.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION.to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;

    RECORDER
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)
}

pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    RECORDER.get()
}

/// Render the exposition text, or a comment line when no recorder is
/// installed.
pub async fn metrics_handler() -> String {
    match RECORDER.get() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    Disabled,
    AlreadyInitialized,
    InstallFailed(String),
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::Disabled => f.write_str("metrics are disabled"),
            MetricsError::AlreadyInitialized => f.write_str("metrics recorder already initialized"),
            MetricsError::InstallFailed(reason) => {
                write!(f, "failed to install metrics recorder: {reason}")
            }
        }
    }
}

impl std::error::Error for MetricsError {}

/// A document operation, as labelled on the entity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Get,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Get => "get",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count a successful operation on `entity` ("Customer", "Driver").
pub fn record_entity_operation(entity: &str, operation: Operation) {
    metrics::counter!(
        ENTITY_OPERATIONS_TOTAL,
        "entity" => entity.to_lowercase(),
        "operation" => operation.as_str()
    )
    .increment(1);
}

/// Count a failed operation. `reason` is the library error's label
/// (`duplicate_key`, `not_found`, ...).
pub fn record_entity_failure(entity: &str, operation: Operation, reason: &'static str) {
    metrics::counter!(
        ENTITY_FAILURES_TOTAL,
        "entity" => entity.to_lowercase(),
        "operation" => operation.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// Publish the connection state code (0-3).
pub fn record_database_state(state: ReadyState) {
    metrics::gauge!(DATABASE_READY_STATE).set(f64::from(state.code()));
}
