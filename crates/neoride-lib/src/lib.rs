//! NeoRide library entry points.
//!
//! This crate holds the customer and driver document model, the builders and
//! merge rules that produce valid documents, the storage traits with their
//! MongoDB and in-memory implementations, and the database connection
//! lifecycle. The HTTP service and the CLI should only depend on what is
//! exported here instead of reimplementing behavior.
//!

#![deny(warnings)]

pub mod connection;
pub mod crud;
pub mod customer;
pub mod driver;
pub mod entity;
pub mod error;
pub mod memory;
pub mod mongo;
pub mod stats;
pub mod store;

pub use connection::{
    Backoff, Connection, ConnectionConfig, ConnectionManager, Connector, FixedDelay, ReadyState,
};
pub use customer::Customer;
pub use driver::{Driver, DriverStatus};
pub use entity::Entity;
pub use error::{Error, FieldErrors, Result};
pub use memory::MemoryStore;
pub use mongo::{MongoConnection, MongoConnector, MongoStore};
pub use stats::{collect_stats, Stats};
pub use store::{EntityStore, Store};
