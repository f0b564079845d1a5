//! Shared infrastructure for the NeoRide HTTP service.
//!
//! This crate provides the HTTP glue around `neoride-lib`:
//!
//! - [`AppState`]: store handle and service configuration
//! - [`ServiceConfig`]: port, environment label and database settings
//! - [`health`]: database health check handler
//! - [`ProblemDetails`]: RFC 9457 Problem Details for consistent error responses
//! - [`metrics`]: Prometheus metrics infrastructure
//! - [`logging`]: Structured logging setup
//! - [`middleware`]: Request IDs, spans and HTTP metrics
//! - [`JsonPayload`]: JSON body extractor with problem-shaped rejections
//!
//! # Architecture
//!
//! Handlers stay thin; all document rules live in `neoride-lib`:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  axum Handler                                               │
//! │  - Extract JSON body / path identity                        │
//! │  - Call neoride-lib CRUD APIs                               │
//! │  - Map errors to ProblemDetails                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides in-memory states for handler testing.
//! Enable the `test-utils` feature to access it from dependent crates.

#![deny(warnings)]

mod config;
mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
mod problem;
mod request;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ServiceConfig, DEFAULT_ENVIRONMENT, DEFAULT_PORT};
pub use health::{health, timestamp_now, HealthStatus};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    init_metrics, metrics_handler, record_database_state, record_entity_failure,
    record_entity_operation, MetricsConfig, MetricsError, Operation,
};
pub use middleware::{
    extract_or_generate_request_id, RequestId, RequestTrackingLayer, REQUEST_ID_HEADER,
};
pub use problem::{
    from_lib_error, ProblemDetails, PROBLEM_CONFIGURATION, PROBLEM_DATABASE_UNAVAILABLE,
    PROBLEM_DUPLICATE_KEY, PROBLEM_INTERNAL_ERROR, PROBLEM_INVALID_REQUEST, PROBLEM_MISSING_FIELDS,
    PROBLEM_NOT_FOUND, PROBLEM_ROUTE_NOT_FOUND, PROBLEM_VALIDATION,
};
pub use request::JsonPayload;
pub use state::AppState;
