//! MongoDB-backed storage.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::event::sdam::SdamEvent;
use mongodb::event::EventHandler;
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel, ServerType};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionConfig, ConnectionManager, Connector, ReadyState};
use crate::customer::Customer;
use crate::driver::Driver;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::store::{EntityStore, Store};

const APP_NAME: &str = "neoride-backend";

/// Opens [`MongoConnection`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoConnector;

/// A connected client plus the state flag its event listener maintains.
pub struct MongoConnection {
    client: Client,
    database: Database,
    state: Arc<AtomicU8>,
}

impl std::fmt::Debug for MongoConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConnection")
            .field("database", &self.database.name())
            .field("state", &self.state())
            .finish()
    }
}

impl MongoConnection {
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Flag the handle so the next `connect()` replaces it.
    pub fn mark_disconnected(&self) {
        self.state
            .store(ReadyState::Disconnected.code(), Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MongoConnection {
    fn state(&self) -> ReadyState {
        ReadyState::from_code(self.state.load(Ordering::SeqCst))
    }

    async fn close(&self) {
        self.state
            .store(ReadyState::Disconnecting.code(), Ordering::SeqCst);
        self.client.clone().shutdown().await;
        self.state
            .store(ReadyState::Disconnected.code(), Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Handle = MongoConnection;

    async fn open(&self, config: &ConnectionConfig) -> Result<MongoConnection> {
        let uri = config.uri().ok_or_else(|| Error::ConfigurationMissing {
            variable: crate::connection::MONGODB_URI_ENV.to_string(),
        })?;

        let mut options = ClientOptions::parse(uri).await.map_err(refused)?;
        apply_timeouts(&mut options, config);
        if options.app_name.is_none() {
            options.app_name = Some(APP_NAME.to_string());
        }

        let state = Arc::new(AtomicU8::new(ReadyState::Connecting.code()));
        options.sdam_event_handler = Some(state_listener(Arc::clone(&state)));

        let client = Client::with_options(options).map_err(refused)?;
        let database = client.database(&config.database);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(refused)?;
        state.store(ReadyState::Connected.code(), Ordering::SeqCst);
        info!(database = %config.database, "database ping succeeded");

        if let Err(err) = ensure_indexes(&database).await {
            warn!(error = %err, "failed to create indexes");
        }

        Ok(MongoConnection {
            client,
            database,
            state,
        })
    }
}

/// Fill in timeouts the connection string leaves unset.
fn apply_timeouts(options: &mut ClientOptions, config: &ConnectionConfig) {
    options.connect_timeout.get_or_insert(config.connect_timeout);
    options
        .server_selection_timeout
        .get_or_insert(config.server_selection_timeout);
}

/// Keep `state` in step with the driver's view of the whole topology. A
/// single member failing its heartbeat leaves the handle usable as long as
/// another member is still reachable.
fn state_listener(state: Arc<AtomicU8>) -> EventHandler<SdamEvent> {
    EventHandler::callback(move |event: SdamEvent| match event {
        SdamEvent::ServerHeartbeatFailed(event) => {
            debug!(server = %event.server_address, "database heartbeat failed");
        }
        SdamEvent::TopologyDescriptionChanged(event) => {
            let servers = event.new_description.servers();
            match topology_state(servers.values().map(|server| server.server_type())) {
                ReadyState::Disconnected => {
                    if state.swap(ReadyState::Disconnected.code(), Ordering::SeqCst)
                        == ReadyState::Connected.code()
                    {
                        warn!("no database servers reachable");
                    }
                }
                _ => {
                    let _ = state.compare_exchange(
                        ReadyState::Disconnected.code(),
                        ReadyState::Connected.code(),
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                }
            }
        }
        SdamEvent::TopologyClosed(_) => {
            debug!("database topology closed");
            state.store(ReadyState::Disconnected.code(), Ordering::SeqCst);
        }
        _ => {}
    })
}

/// Connected while any server in the topology is known, disconnected once
/// every server is unknown.
fn topology_state(server_types: impl IntoIterator<Item = ServerType>) -> ReadyState {
    if server_types
        .into_iter()
        .any(|server_type| server_type != ServerType::Unknown)
    {
        ReadyState::Connected
    } else {
        ReadyState::Disconnected
    }
}

fn refused(err: mongodb::error::Error) -> Error {
    Error::ConnectionRefused {
        message: err.to_string(),
    }
}

/// True when the failure means the server could not be reached.
fn is_connectivity_error(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_)
    )
}

async fn ensure_indexes(database: &Database) -> Result<()> {
    database
        .collection::<Document>(Customer::COLLECTION)
        .create_indexes(unique_indexes(Customer::UNIQUE_FIELDS))
        .await?;

    let mut driver_indexes = unique_indexes(Driver::UNIQUE_FIELDS);
    driver_indexes.push(IndexModel::builder().keys(doc! { "location": "2dsphere" }).build());
    database
        .collection::<Document>(Driver::COLLECTION)
        .create_indexes(driver_indexes)
        .await?;

    debug!("database indexes ensured");
    Ok(())
}

fn unique_indexes(fields: &[&str]) -> Vec<IndexModel> {
    fields
        .iter()
        .map(|field| {
            IndexModel::builder()
                .keys(doc! { *field: 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build()
        })
        .collect()
}

/// One typed collection. Every operation connects first.
pub struct MongoCollection<T> {
    manager: Arc<ConnectionManager<MongoConnector>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> MongoCollection<T> {
    fn new(manager: Arc<ConnectionManager<MongoConnector>>) -> Self {
        Self {
            manager,
            _marker: PhantomData,
        }
    }

    async fn open(&self) -> Result<(Arc<MongoConnection>, Collection<T>)> {
        let connection = self.manager.connect().await?;
        let collection = connection.database().collection::<T>(T::COLLECTION);
        Ok((connection, collection))
    }

    fn fail(&self, connection: &MongoConnection, err: mongodb::error::Error) -> Error {
        if is_connectivity_error(&err) {
            connection.mark_disconnected();
        }
        Error::from_mongo(T::NAME, err)
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MongoCollection<T> {
    async fn insert(&self, document: &T) -> Result<()> {
        let (connection, collection) = self.open().await?;
        collection
            .insert_one(document)
            .await
            .map_err(|err| self.fail(&connection, err))?;
        Ok(())
    }

    async fn find(&self, external_id: &str) -> Result<Option<T>> {
        let (connection, collection) = self.open().await?;
        collection
            .find_one(doc! { "externalId": external_id })
            .await
            .map_err(|err| self.fail(&connection, err))
    }

    async fn replace(&self, external_id: &str, document: &T) -> Result<Option<T>> {
        let (connection, collection) = self.open().await?;
        collection
            .find_one_and_replace(doc! { "externalId": external_id }, document)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| self.fail(&connection, err))
    }

    async fn delete(&self, external_id: &str) -> Result<Option<T>> {
        let (connection, collection) = self.open().await?;
        collection
            .find_one_and_delete(doc! { "externalId": external_id })
            .await
            .map_err(|err| self.fail(&connection, err))
    }

    async fn count(&self) -> Result<u64> {
        let (connection, collection) = self.open().await?;
        collection
            .count_documents(doc! {})
            .await
            .map_err(|err| self.fail(&connection, err))
    }

    async fn count_where(&self, field: &str, value: Value) -> Result<u64> {
        let value: Bson = mongodb::bson::to_bson(&value).map_err(|err| Error::InvalidPayload {
            message: format!("cannot filter on {field}: {err}"),
        })?;
        let (connection, collection) = self.open().await?;
        collection
            .count_documents(doc! { field: value })
            .await
            .map_err(|err| self.fail(&connection, err))
    }
}

/// [`Store`] over a shared [`ConnectionManager`].
pub struct MongoStore {
    manager: Arc<ConnectionManager<MongoConnector>>,
    customers: MongoCollection<Customer>,
    drivers: MongoCollection<Driver>,
}

impl std::fmt::Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore")
            .field("manager", &self.manager)
            .finish()
    }
}

impl MongoStore {
    pub fn new(manager: Arc<ConnectionManager<MongoConnector>>) -> Self {
        Self {
            customers: MongoCollection::new(Arc::clone(&manager)),
            drivers: MongoCollection::new(Arc::clone(&manager)),
            manager,
        }
    }

    /// Store with its own manager for `config`.
    pub fn from_config(config: ConnectionConfig) -> Self {
        Self::new(Arc::new(ConnectionManager::new(config, MongoConnector)))
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<MongoConnector>> {
        &self.manager
    }
}

#[async_trait]
impl Store for MongoStore {
    fn customers(&self) -> &dyn EntityStore<Customer> {
        &self.customers
    }

    fn drivers(&self) -> &dyn EntityStore<Driver> {
        &self.drivers
    }

    async fn ping(&self) -> Result<()> {
        let connection = self.manager.connect().await?;
        match connection.database().run_command(doc! { "ping": 1 }).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if is_connectivity_error(&err) {
                    connection.mark_disconnected();
                }
                Err(Error::from(err))
            }
        }
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let connection = self.manager.connect().await?;
        let names = connection.database().list_collection_names().await?;
        Ok(names)
    }

    fn ready_state(&self) -> ReadyState {
        self.manager.ready_state()
    }

    fn database_name(&self) -> &str {
        &self.manager.config().database
    }
}
