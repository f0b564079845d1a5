//! In-process [`Store`] for tests and local runs without a database.
//!
//! Enforces the same unique fields as the MongoDB indexes. A store built with
//! [`MemoryStore::unreachable`] fails every operation the way an unreachable
//! server would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::connection::{ReadyState, DEFAULT_DATABASE, DEFAULT_MAX_ATTEMPTS};
use crate::customer::Customer;
use crate::driver::Driver;
use crate::entity::{to_json, Entity};
use crate::error::{Error, Result};
use crate::store::{EntityStore, Store};

const OUTAGE_MESSAGE: &str = "Server selection timeout: No available servers";

pub struct MemoryCollection<T> {
    documents: Mutex<Vec<T>>,
    reachable: Arc<AtomicBool>,
}

impl<T: Entity> MemoryCollection<T> {
    fn new(reachable: Arc<AtomicBool>) -> Self {
        Self {
            documents: Mutex::new(Vec::new()),
            reachable,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<T>>> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(outage());
        }
        self.documents.lock().map_err(|_| Error::Storage {
            message: format!("{} collection lock poisoned", T::COLLECTION),
        })
    }
}

/// First unique field of `candidate` already used by a document other than
/// the one at `skip`.
fn conflicting_field<T: Entity>(documents: &[T], candidate: &T, skip: Option<usize>) -> Option<&'static str> {
    let wanted = candidate.unique_values();
    for (field, value) in &wanted {
        let taken = documents.iter().enumerate().any(|(index, existing)| {
            Some(index) != skip
                && existing
                    .unique_values()
                    .iter()
                    .any(|(other_field, other_value)| other_field == field && other_value == value)
        });
        if taken {
            return Some(*field);
        }
    }
    None
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MemoryCollection<T> {
    async fn insert(&self, document: &T) -> Result<()> {
        let mut documents = self.lock()?;
        if let Some(field) = conflicting_field(&documents, document, None) {
            return Err(Error::DuplicateKey {
                entity: T::NAME,
                field: field.to_string(),
            });
        }
        documents.push(document.clone());
        Ok(())
    }

    async fn find(&self, external_id: &str) -> Result<Option<T>> {
        let documents = self.lock()?;
        Ok(documents
            .iter()
            .find(|document| document.external_id() == external_id)
            .cloned())
    }

    async fn replace(&self, external_id: &str, document: &T) -> Result<Option<T>> {
        let mut documents = self.lock()?;
        let Some(index) = documents
            .iter()
            .position(|existing| existing.external_id() == external_id)
        else {
            return Ok(None);
        };
        if let Some(field) = conflicting_field(&documents, document, Some(index)) {
            return Err(Error::DuplicateKey {
                entity: T::NAME,
                field: field.to_string(),
            });
        }
        documents[index] = document.clone();
        Ok(Some(document.clone()))
    }

    async fn delete(&self, external_id: &str) -> Result<Option<T>> {
        let mut documents = self.lock()?;
        let index = documents
            .iter()
            .position(|existing| existing.external_id() == external_id);
        Ok(index.map(|index| documents.remove(index)))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.lock()?.len() as u64)
    }

    async fn count_where(&self, field: &str, value: Value) -> Result<u64> {
        let documents = self.lock()?;
        let mut count = 0;
        for document in documents.iter() {
            if to_json(document)?.get(field) == Some(&value) {
                count += 1;
            }
        }
        Ok(count)
    }
}

pub struct MemoryStore {
    customers: MemoryCollection<Customer>,
    drivers: MemoryCollection<Driver>,
    reachable: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("reachable", &self.is_reachable())
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_reachability(true)
    }

    /// A store whose every operation fails as a database outage.
    pub fn unreachable() -> Self {
        Self::with_reachability(false)
    }

    fn with_reachability(reachable: bool) -> Self {
        let reachable = Arc::new(AtomicBool::new(reachable));
        Self {
            customers: MemoryCollection::new(Arc::clone(&reachable)),
            drivers: MemoryCollection::new(Arc::clone(&reachable)),
            reachable,
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(outage())
        }
    }
}

fn outage() -> Error {
    Error::ConnectionExhausted {
        attempts: DEFAULT_MAX_ATTEMPTS,
        last_error: OUTAGE_MESSAGE.to_string(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn customers(&self) -> &dyn EntityStore<Customer> {
        &self.customers
    }

    fn drivers(&self) -> &dyn EntityStore<Driver> {
        &self.drivers
    }

    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        self.check_reachable()?;
        Ok(vec![
            Customer::COLLECTION.to_string(),
            Driver::COLLECTION.to_string(),
        ])
    }

    fn ready_state(&self) -> ReadyState {
        if self.is_reachable() {
            ReadyState::Connected
        } else {
            ReadyState::Disconnected
        }
    }

    fn database_name(&self) -> &str {
        DEFAULT_DATABASE
    }
}
