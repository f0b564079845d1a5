//! Test utilities for handler testing.
//!
//! States here run on the in-memory store, so handler tests need no database.

use std::sync::Arc;

use neoride_lib::{ConnectionConfig, MemoryStore, MongoStore};

use crate::config::ServiceConfig;
use crate::state::AppState;

/// Configuration with defaults and no connection string.
pub fn test_config() -> ServiceConfig {
    ServiceConfig::with_connection(ConnectionConfig::new(None, "NeoRide"))
}

/// A fresh, empty, reachable in-memory state.
pub fn test_state() -> AppState {
    AppState::new(Arc::new(MemoryStore::new()), test_config())
}

/// State whose store fails every operation as a database outage.
pub fn unreachable_state() -> AppState {
    AppState::new(Arc::new(MemoryStore::unreachable()), test_config())
}

/// MongoDB-backed state with no connection string. Every storage call fails
/// with a configuration error before any network I/O.
pub fn unconfigured_state() -> AppState {
    let config = test_config();
    let store = MongoStore::from_config(config.connection.clone());
    AppState::new(Arc::new(store), config)
}

/// Generate a unique request ID for testing.
pub fn test_request_id() -> String {
    format!("test-{}", crate::middleware::RequestId::generate())
}

/// A complete customer create payload.
pub fn customer_payload(external_id: &str, email: &str) -> serde_json::Value {
    serde_json::json!({
        "externalId": external_id,
        "email": email,
        "fullName": "Jo Rider",
        "phone": "555-0100"
    })
}

/// A complete driver create payload.
pub fn driver_payload(external_id: &str, email: &str, license: &str, plate: &str) -> serde_json::Value {
    serde_json::json!({
        "externalId": external_id,
        "email": email,
        "fullName": "Sam Driver",
        "phone": "555-0199",
        "licenseNumber": license,
        "vehicleModel": "Toyota Innova Crysta",
        "vehiclePlate": plate
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neoride_lib::ReadyState;

    #[test]
    fn test_states_report_expected_ready_state() {
        assert_eq!(test_state().store().ready_state(), ReadyState::Connected);
        assert_eq!(unreachable_state().store().ready_state(), ReadyState::Disconnected);
        assert_eq!(unconfigured_state().store().ready_state(), ReadyState::Disconnected);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(test_request_id(), test_request_id());
    }

    #[tokio::test]
    async fn test_unconfigured_state_reports_configuration_error() {
        let err = unconfigured_state().store().ping().await.unwrap_err();
        assert_eq!(err.reason(), "configuration_missing");
    }
}
