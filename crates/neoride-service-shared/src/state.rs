//! Application state for the HTTP service.
//!
//! Handlers reach the store and the service configuration through this
//! struct via axum's `State` extractor.

use std::sync::Arc;

use neoride_lib::{MongoStore, Store};

use crate::config::ServiceConfig;

/// Store and configuration handed to every handler. Clones share one
/// allocation.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, routing::get, extract::State};
/// use neoride_service_shared::{AppState, ServiceConfig};
///
/// async fn handler(State(state): State<AppState>) {
///     let names = state.store().collection_names().await;
///     // ...
/// }
///
/// let state = AppState::mongo(ServiceConfig::from_env()).0;
/// let app = Router::new().route("/", get(handler)).with_state(state);
/// ```
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn Store>,
    config: ServiceConfig,
}

impl AppState {
    /// State over any store.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner { store, config }),
        }
    }

    /// State backed by MongoDB. Nothing is dialled until the first storage
    /// call. The store is also returned so the caller can disconnect on
    /// shutdown.
    pub fn mongo(config: ServiceConfig) -> (Self, Arc<MongoStore>) {
        let store = Arc::new(MongoStore::from_config(config.connection.clone()));
        tracing::info!(
            database = %store.database_name(),
            uri = config.uri_status(),
            "database store configured"
        );
        (Self::new(store.clone(), config), store)
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("database", &self.inner.store.database_name())
            .field("ready_state", &self.inner.store.ready_state())
            .field("environment", &self.inner.config.environment)
            .finish()
    }
}
