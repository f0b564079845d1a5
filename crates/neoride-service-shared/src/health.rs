//! Database health check.
//!
//! `GET /api/health` pings the database and reports the connection state.
//! A failed ping answers 500 with the driver's message.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::record_database_state;
use crate::AppState;

/// Health response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// "success" or "error".
    pub status: String,

    pub message: String,

    /// Whether the ping succeeded.
    pub connected: bool,

    /// Connection state code (0 disconnected, 1 connected, 2 connecting, 3 disconnecting).
    pub mongo_state: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: String,
}

impl HealthStatus {
    pub fn healthy(mongo_state: u8, environment: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: "API is running".to_string(),
            connected: true,
            mongo_state,
            environment: Some(environment.to_string()),
            error: None,
            timestamp: timestamp_now(),
        }
    }

    pub fn unhealthy(mongo_state: u8, error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: "Database connection failed".to_string(),
            connected: false,
            mongo_state,
            environment: None,
            error: Some(error.into()),
            timestamp: timestamp_now(),
        }
    }
}

/// Current time as RFC 3339 with milliseconds, UTC.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Health handler.
///
/// # Example
///
/// ```text
/// GET /api/health
/// {"status":"success","message":"API is running","connected":true,"mongoState":1,"environment":"development","timestamp":"2025-01-01T00:00:00.000Z"}
/// ```
pub async fn health(State(state): State<AppState>) -> Response {
    let store = state.store();

    match store.ping().await {
        Ok(()) => {
            let ready = store.ready_state();
            record_database_state(ready);
            let status = HealthStatus::healthy(ready.code(), &state.config().environment);
            (StatusCode::OK, Json(status)).into_response()
        }
        Err(err) => {
            let ready = store.ready_state();
            record_database_state(ready);
            tracing::error!(error = %err, reason = err.reason(), "health check failed");
            let status = HealthStatus::unhealthy(ready.code(), err.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(status)).into_response()
        }
    }
}
