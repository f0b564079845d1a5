//! Storage abstractions.
//!
//! Handlers and the CRUD layer talk to these traits only. [`crate::mongo`]
//! provides the production implementation and [`crate::memory`] an
//! in-process one.

use async_trait::async_trait;
use serde_json::Value;

use crate::connection::ReadyState;
use crate::customer::Customer;
use crate::driver::Driver;
use crate::entity::Entity;
use crate::error::Result;

/// One collection of `T` documents addressed by external identity.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    /// Insert a fully built document. Uniqueness violations surface as
    /// [`crate::Error::DuplicateKey`].
    async fn insert(&self, document: &T) -> Result<()>;

    async fn find(&self, external_id: &str) -> Result<Option<T>>;

    /// Atomically replace the document with `external_id`, returning the
    /// stored result or `None` when nothing matched.
    async fn replace(&self, external_id: &str, document: &T) -> Result<Option<T>>;

    /// Remove and return the document with `external_id`.
    async fn delete(&self, external_id: &str) -> Result<Option<T>>;

    async fn count(&self) -> Result<u64>;

    /// Count documents whose top-level `field` equals `value`.
    async fn count_where(&self, field: &str, value: Value) -> Result<u64>;
}

/// A database holding both collections.
#[async_trait]
pub trait Store: Send + Sync {
    fn customers(&self) -> &dyn EntityStore<Customer>;

    fn drivers(&self) -> &dyn EntityStore<Driver>;

    /// Round-trip to the database, connecting first if needed.
    async fn ping(&self) -> Result<()>;

    async fn collection_names(&self) -> Result<Vec<String>>;

    /// Current connection state without attempting to connect.
    fn ready_state(&self) -> ReadyState;

    fn database_name(&self) -> &str;
}
