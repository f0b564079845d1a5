//! Create, read, update and delete for any [`Entity`].

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::entity::{apply_update, build, Entity};
use crate::error::{Error, Result};
use crate::store::Store;

/// Build a document from `payload` and insert it.
pub async fn create<T: Entity>(store: &dyn Store, payload: Value) -> Result<T> {
    let document: T = build(payload, Utc::now())?;
    T::select(store).insert(&document).await?;
    info!(
        entity = T::NAME,
        external_id = document.external_id(),
        "document created"
    );
    Ok(document)
}

pub async fn get<T: Entity>(store: &dyn Store, external_id: &str) -> Result<T> {
    T::select(store)
        .find(external_id)
        .await?
        .ok_or_else(|| not_found::<T>(external_id))
}

/// Merge `patch` into the stored document and replace it.
pub async fn update<T: Entity>(store: &dyn Store, external_id: &str, patch: Value) -> Result<T> {
    let collection = T::select(store);
    let existing = collection
        .find(external_id)
        .await?
        .ok_or_else(|| not_found::<T>(external_id))?;

    let merged = apply_update(&existing, patch, Utc::now())?;
    let stored = collection
        .replace(external_id, &merged)
        .await?
        .ok_or_else(|| not_found::<T>(external_id))?;

    debug!(entity = T::NAME, external_id, "document updated");
    Ok(stored)
}

/// Remove the document, returning what was stored.
pub async fn delete<T: Entity>(store: &dyn Store, external_id: &str) -> Result<T> {
    let removed = T::select(store)
        .delete(external_id)
        .await?
        .ok_or_else(|| not_found::<T>(external_id))?;
    info!(entity = T::NAME, external_id, "document deleted");
    Ok(removed)
}

/// Confirmation text returned after a delete.
pub fn deleted_message<T: Entity>() -> String {
    format!("{} deleted successfully", T::NAME)
}

fn not_found<T: Entity>(external_id: &str) -> Error {
    Error::NotFound {
        entity: T::NAME,
        external_id: external_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::Customer;
    use crate::driver::Driver;
    use crate::memory::MemoryStore;
    use serde_json::json;

    fn customer_payload(external_id: &str, email: &str) -> Value {
        json!({
            "externalId": external_id,
            "email": email,
            "fullName": "Jo",
            "phone": "555",
            "address": {"city": "Pune"}
        })
    }

    fn driver_payload(external_id: &str, plate: &str, license: &str) -> Value {
        json!({
            "externalId": external_id,
            "email": format!("{external_id}@drivers.test"),
            "fullName": "Sam",
            "phone": "555",
            "licenseNumber": license,
            "vehicleModel": "Honda City",
            "vehiclePlate": plate
        })
    }

    #[tokio::test]
    async fn create_then_get_returns_caller_fields() {
        let store = MemoryStore::new();
        let created: Customer = create(&store, customer_payload("u1", "A@B.com")).await.unwrap();
        let fetched: Customer = get(&store, "u1").await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.email, "a@b.com");
        assert_eq!(fetched.full_name, "Jo");
        assert_eq!(fetched.address.city.as_deref(), Some("Pune"));
    }

    #[tokio::test]
    async fn missing_fields_persist_nothing() {
        let store = MemoryStore::new();
        let err = create::<Customer>(&store, json!({"externalId": "u1"}))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "missing_field");
        assert_eq!(store.customers().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_email_differs_only_in_case() {
        let store = MemoryStore::new();
        create::<Customer>(&store, customer_payload("u1", "a@b.com")).await.unwrap();
        let err = create::<Customer>(&store, customer_payload("u2", "A@B.COM"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateKey { entity: "Customer", ref field } if field == "email"));
    }

    #[tokio::test]
    async fn duplicate_plate_and_license_are_named() {
        let store = MemoryStore::new();
        create::<Driver>(&store, driver_payload("d1", "ab12", "L1")).await.unwrap();

        let err = create::<Driver>(&store, driver_payload("d2", "AB12", "L2"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref field, .. } if field == "vehiclePlate"));

        let err = create::<Driver>(&store, driver_payload("d3", "CD34", "L1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref field, .. } if field == "licenseNumber"));
    }

    #[tokio::test]
    async fn operations_on_missing_identity_are_not_found() {
        let store = MemoryStore::new();

        let err = get::<Customer>(&store, "ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "Customer", ref external_id } if external_id == "ghost"));
        assert_eq!(
            update::<Customer>(&store, "ghost", json!({"fullName": "x"}))
                .await
                .unwrap_err()
                .reason(),
            "not_found"
        );
        assert_eq!(
            delete::<Driver>(&store, "ghost").await.unwrap_err().reason(),
            "not_found"
        );
    }

    #[tokio::test]
    async fn update_merges_and_keeps_identity() {
        let store = MemoryStore::new();
        let created: Customer = create(&store, customer_payload("u1", "a@b.com")).await.unwrap();

        let updated: Customer = update(&store, "u1", json!({"fullName": "Jo B", "email": "NEW@B.com"}))
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.full_name, "Jo B");
        assert_eq!(updated.email, "new@b.com");
        assert_eq!(updated.phone, "555");
        assert_eq!(get::<Customer>(&store, "u1").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn update_into_taken_email_is_duplicate() {
        let store = MemoryStore::new();
        create::<Customer>(&store, customer_payload("u1", "a@b.com")).await.unwrap();
        create::<Customer>(&store, customer_payload("u2", "c@d.com")).await.unwrap();

        let err = update::<Customer>(&store, "u2", json!({"email": "a@b.com"}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "duplicate_key");
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let store = MemoryStore::new();
        create::<Driver>(&store, driver_payload("d1", "ab12", "L1")).await.unwrap();

        let removed: Driver = delete(&store, "d1").await.unwrap();
        assert_eq!(removed.external_id, "d1");
        assert!(get::<Driver>(&store, "d1").await.is_err());
        assert_eq!(deleted_message::<Driver>(), "Driver deleted successfully");
    }
}
