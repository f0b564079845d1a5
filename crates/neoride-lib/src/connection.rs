//! Database connection lifecycle.
//!
//! [`ConnectionManager`] owns the single cached database handle for a process.
//! It is created by the entry point and shared by `Arc`; every storage
//! operation asks it for a live handle first. Connecting is a bounded retry
//! loop whose delay is supplied by a [`Backoff`].

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Environment variable holding the connection string.
pub const MONGODB_URI_ENV: &str = "MONGODB_URI";

/// Environment variable naming the database when the URI has none.
pub const MONGODB_DATABASE_ENV: &str = "MONGODB_DATABASE";

/// Database used when neither the URI nor the environment names one.
pub const DEFAULT_DATABASE: &str = "NeoRide";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state, reported as its integer code (0-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Disconnected = 0,
    Connected = 1,
    Connecting = 2,
    Disconnecting = 3,
}

impl ReadyState {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReadyState::Disconnected => "disconnected",
            ReadyState::Connected => "connected",
            ReadyState::Connecting => "connecting",
            ReadyState::Disconnecting => "disconnecting",
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ReadyState::Connected,
            2 => ReadyState::Connecting,
            3 => ReadyState::Disconnecting,
            _ => ReadyState::Disconnected,
        }
    }
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReadyState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Connection settings. Retry and timeout values default to the
/// `DEFAULT_*` constants.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub uri: Option<String>,
    pub database: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub server_selection_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(uri: Option<String>, database: impl Into<String>) -> Self {
        Self {
            uri,
            database: database.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT,
        }
    }

    /// Read `MONGODB_URI` and `MONGODB_DATABASE`. A database named in the
    /// URI path wins over the environment.
    pub fn from_env() -> Self {
        let uri = std::env::var(MONGODB_URI_ENV).ok();
        let fallback = std::env::var(MONGODB_DATABASE_ENV).ok();
        Self::resolve(uri, fallback.as_deref())
    }

    /// Build a config, picking the database from the URI, then `fallback`,
    /// then [`DEFAULT_DATABASE`].
    pub fn resolve(uri: Option<String>, fallback: Option<&str>) -> Self {
        let database = uri
            .as_deref()
            .and_then(database_from_uri)
            .or_else(|| fallback.filter(|name| !name.trim().is_empty()))
            .unwrap_or(DEFAULT_DATABASE)
            .to_string();
        Self::new(uri, database)
    }

    /// The connection string, if one is configured and non-blank.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref().filter(|uri| !uri.trim().is_empty())
    }

    pub fn has_uri(&self) -> bool {
        self.uri().is_some()
    }
}

/// A live database handle.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Current state as last observed by the driver.
    fn state(&self) -> ReadyState;

    /// Close the handle. Further use is undefined.
    async fn close(&self);
}

/// Opens database handles.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Connection;

    /// Make a single connection attempt, verifying it is usable before
    /// returning. Failures should be [`Error::ConnectionRefused`].
    async fn open(&self, config: &ConnectionConfig) -> Result<Self::Handle>;
}

/// Delay between failed connection attempts.
#[async_trait]
pub trait Backoff: Send + Sync {
    /// Called after failed attempt number `attempt` (1-based) when another
    /// attempt follows.
    async fn wait(&self, attempt: u32);
}

/// Waits the same duration after every failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

#[async_trait]
impl Backoff for FixedDelay {
    async fn wait(&self, _attempt: u32) {
        tokio::time::sleep(self.0).await;
    }
}

struct Slot<H> {
    handle: Option<Arc<H>>,
    attempts: u32,
}

/// Owns the cached handle and the attempt counter.
pub struct ConnectionManager<C: Connector> {
    config: ConnectionConfig,
    connector: C,
    backoff: Arc<dyn Backoff>,
    slot: Mutex<Slot<C::Handle>>,
    connecting: AtomicBool,
    /// State last read under the slot lock, reported while the lock is held.
    last_state: AtomicU8,
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("database", &self.config.database)
            .field("uri_configured", &self.config.has_uri())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Manager waiting `config.retry_delay` between attempts.
    pub fn new(config: ConnectionConfig, connector: C) -> Self {
        let backoff = Arc::new(FixedDelay(config.retry_delay));
        Self::with_backoff(config, connector, backoff)
    }

    pub fn with_backoff(config: ConnectionConfig, connector: C, backoff: Arc<dyn Backoff>) -> Self {
        Self {
            config,
            connector,
            backoff,
            slot: Mutex::new(Slot {
                handle: None,
                attempts: 0,
            }),
            connecting: AtomicBool::new(false),
            last_state: AtomicU8::new(ReadyState::Disconnected.code()),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return the cached handle if it is connected, otherwise dial.
    ///
    /// Callers are serialised: while one caller dials, others wait and then
    /// observe its result. A missing connection string fails immediately
    /// without consuming an attempt.
    pub async fn connect(&self) -> Result<Arc<C::Handle>> {
        let mut slot = self.slot.lock().await;

        if let Some(handle) = &slot.handle {
            if handle.state() == ReadyState::Connected {
                self.remember(ReadyState::Connected);
                return Ok(Arc::clone(handle));
            }
        }

        if !self.config.has_uri() {
            return Err(Error::ConfigurationMissing {
                variable: MONGODB_URI_ENV.to_string(),
            });
        }

        if let Some(stale) = slot.handle.take() {
            let state = stale.state();
            debug!(state = %state, "discarding stale database handle");
            if state != ReadyState::Disconnected {
                stale.close().await;
            }
        }

        self.connecting.store(true, Ordering::SeqCst);
        let _connecting = ConnectingFlag(&self.connecting);
        self.dial(&mut slot).await
    }

    async fn dial(&self, slot: &mut Slot<C::Handle>) -> Result<Arc<C::Handle>> {
        let max_attempts = self.config.max_attempts.max(1);

        loop {
            slot.attempts += 1;
            let attempt = slot.attempts;
            info!(
                attempt,
                max_attempts,
                database = %self.config.database,
                "connecting to database"
            );

            match self.connector.open(&self.config).await {
                Ok(handle) => {
                    let handle = Arc::new(handle);
                    slot.handle = Some(Arc::clone(&handle));
                    slot.attempts = 0;
                    self.remember(handle.state());
                    info!(attempt, "database connected");
                    return Ok(handle);
                }
                Err(err) => {
                    slot.handle = None;
                    self.remember(ReadyState::Disconnected);
                    warn!(attempt, max_attempts, error = %err, "database connection attempt failed");

                    if attempt >= max_attempts {
                        slot.attempts = 0;
                        return Err(Error::ConnectionExhausted {
                            attempts: attempt,
                            last_error: cause(err),
                        });
                    }

                    self.backoff.wait(attempt).await;
                }
            }
        }
    }

    /// State of the cached handle, without connecting. While another caller
    /// holds the handle, the last observed state is reported.
    pub fn ready_state(&self) -> ReadyState {
        if self.connecting.load(Ordering::SeqCst) {
            return ReadyState::Connecting;
        }
        match self.slot.try_lock() {
            Ok(slot) => {
                let state = slot
                    .handle
                    .as_ref()
                    .map(|handle| handle.state())
                    .unwrap_or(ReadyState::Disconnected);
                self.remember(state);
                state
            }
            Err(_) => ReadyState::from_code(self.last_state.load(Ordering::SeqCst)),
        }
    }

    fn remember(&self, state: ReadyState) {
        self.last_state.store(state.code(), Ordering::SeqCst);
    }

    /// Failed attempts since the last success or exhaustion.
    pub async fn attempts(&self) -> u32 {
        self.slot.lock().await.attempts
    }

    /// Close and forget the cached handle.
    pub async fn disconnect(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.handle.take() {
            handle.close().await;
            info!("database disconnected");
        }
        self.remember(ReadyState::Disconnected);
    }
}

/// Clears the in-progress flag even if the connecting future is dropped.
struct ConnectingFlag<'a>(&'a AtomicBool);

impl Drop for ConnectingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Database name from the path of a `mongodb://` or `mongodb+srv://` URI.
pub fn database_from_uri(uri: &str) -> Option<&str> {
    let (_, rest) = uri.split_once("://")?;
    let (_, path) = rest.split_once('/')?;
    let name = path.split('?').next().unwrap_or_default();
    (!name.is_empty()).then_some(name)
}

fn cause(err: Error) -> String {
    match err {
        Error::ConnectionRefused { message } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct FakeHandle {
        state: StdMutex<ReadyState>,
        closed: AtomicBool,
    }

    impl FakeHandle {
        fn set_state(&self, state: ReadyState) {
            *self.state.lock().unwrap() = state;
        }
    }

    #[async_trait]
    impl Connection for FakeHandle {
        fn state(&self) -> ReadyState {
            *self.state.lock().unwrap()
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            self.set_state(ReadyState::Disconnected);
        }
    }

    /// Fails the first `failures` dials, then succeeds.
    #[derive(Debug)]
    struct FakeConnector {
        failures: u32,
        dials: AtomicU32,
    }

    impl FakeConnector {
        fn failing(failures: u32) -> Self {
            Self {
                failures,
                dials: AtomicU32::new(0),
            }
        }

        fn dials(&self) -> u32 {
            self.dials.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Handle = FakeHandle;

        async fn open(&self, _config: &ConnectionConfig) -> Result<FakeHandle> {
            let dial = self.dials.fetch_add(1, Ordering::SeqCst) + 1;
            if dial <= self.failures {
                return Err(Error::ConnectionRefused {
                    message: format!("dial {dial} refused"),
                });
            }
            Ok(FakeHandle {
                state: StdMutex::new(ReadyState::Connected),
                closed: AtomicBool::new(false),
            })
        }
    }

    #[derive(Default)]
    struct RecordingBackoff {
        waits: StdMutex<Vec<u32>>,
    }

    #[async_trait]
    impl Backoff for RecordingBackoff {
        async fn wait(&self, attempt: u32) {
            self.waits.lock().unwrap().push(attempt);
        }
    }

    fn manager(
        uri: Option<&str>,
        failures: u32,
    ) -> (ConnectionManager<FakeConnector>, Arc<RecordingBackoff>) {
        let backoff = Arc::new(RecordingBackoff::default());
        let config = ConnectionConfig::new(uri.map(str::to_string), DEFAULT_DATABASE);
        let manager =
            ConnectionManager::with_backoff(config, FakeConnector::failing(failures), backoff.clone());
        (manager, backoff)
    }

    #[tokio::test]
    async fn missing_uri_fails_without_attempts_or_delay() {
        let (manager, backoff) = manager(None, 0);

        let err = manager.connect().await.unwrap_err();

        assert!(matches!(err, Error::ConfigurationMissing { ref variable } if variable == "MONGODB_URI"));
        assert_eq!(manager.attempts().await, 0);
        assert_eq!(manager.connector().dials(), 0);
        assert!(backoff.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_uri_counts_as_missing() {
        let (manager, _) = manager(Some("   "), 0);
        let err = manager.connect().await.unwrap_err();
        assert_eq!(err.reason(), "configuration_missing");
    }

    #[tokio::test]
    async fn healthy_handle_is_reused() {
        let (manager, _) = manager(Some("mongodb://localhost"), 0);

        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.connector().dials(), 1);
        assert_eq!(manager.ready_state(), ReadyState::Connected);
    }

    #[tokio::test]
    async fn retries_then_succeeds_and_resets_counter() {
        let (manager, backoff) = manager(Some("mongodb://localhost"), 2);

        manager.connect().await.unwrap();

        assert_eq!(manager.connector().dials(), 3);
        assert_eq!(*backoff.waits.lock().unwrap(), vec![1, 2]);
        assert_eq!(manager.attempts().await, 0);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (manager, backoff) = manager(Some("mongodb://localhost"), 10);

        let err = manager.connect().await.unwrap_err();

        match err {
            Error::ConnectionExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "dial 3 refused");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*backoff.waits.lock().unwrap(), vec![1, 2]);
        assert_eq!(manager.attempts().await, 0);
        assert_eq!(manager.ready_state(), ReadyState::Disconnected);

        // A later call gets a fresh budget.
        let _ = manager.connect().await;
        assert_eq!(manager.connector().dials(), 6);
    }

    #[tokio::test]
    async fn stale_handle_is_closed_and_replaced() {
        let (manager, _) = manager(Some("mongodb://localhost"), 0);

        let first = manager.connect().await.unwrap();
        first.set_state(ReadyState::Connecting);

        let second = manager.connect().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.closed.load(Ordering::SeqCst));
        assert_eq!(manager.connector().dials(), 2);
    }

    #[tokio::test]
    async fn dropped_handle_is_not_closed_again() {
        let (manager, _) = manager(Some("mongodb://localhost"), 0);

        let first = manager.connect().await.unwrap();
        first.set_state(ReadyState::Disconnected);
        manager.connect().await.unwrap();

        assert!(!first.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_dial() {
        let (manager, _) = manager(Some("mongodb://localhost"), 0);
        let manager = Arc::new(manager);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            tasks.push(tokio::spawn(async move { manager.connect().await.map(|_| ()) }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(manager.connector().dials(), 1);
    }

    #[tokio::test]
    async fn busy_lock_reports_last_known_state() {
        let (manager, _) = manager(Some("mongodb://localhost"), 0);
        assert_eq!(manager.ready_state(), ReadyState::Disconnected);

        manager.connect().await.unwrap();
        let _held = manager.slot.lock().await;

        assert_eq!(manager.ready_state(), ReadyState::Connected);
    }

    #[tokio::test]
    async fn disconnect_clears_the_cache() {
        let (manager, _) = manager(Some("mongodb://localhost"), 0);

        let handle = manager.connect().await.unwrap();
        manager.disconnect().await;

        assert!(handle.closed.load(Ordering::SeqCst));
        assert_eq!(manager.ready_state(), ReadyState::Disconnected);
    }

    #[test]
    fn database_name_resolution() {
        assert_eq!(
            database_from_uri("mongodb+srv://u:p@cluster.example.net/NeoRide?retryWrites=true"),
            Some("NeoRide")
        );
        assert_eq!(database_from_uri("mongodb://localhost:27017/"), None);
        assert_eq!(database_from_uri("mongodb://localhost:27017/?w=1"), None);
        assert_eq!(database_from_uri("mongodb://localhost:27017"), None);

        let config = ConnectionConfig::resolve(Some("mongodb://localhost/rides".into()), Some("Other"));
        assert_eq!(config.database, "rides");
        let config = ConnectionConfig::resolve(Some("mongodb://localhost".into()), Some("Other"));
        assert_eq!(config.database, "Other");
        let config = ConnectionConfig::resolve(None, Some(" "));
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn ready_state_serialises_as_integer() {
        assert_eq!(serde_json::to_value(ReadyState::Connected).unwrap(), 1);
        assert_eq!(serde_json::to_value(ReadyState::Disconnecting).unwrap(), 3);
        assert_eq!(ReadyState::from_code(2), ReadyState::Connecting);
    }
}
