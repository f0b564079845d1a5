//! Shared document machinery for customers and drivers.
//!
//! Documents are assembled as JSON objects (caller fields, server defaults,
//! stored state) and only then decoded into their typed form. Decoding doubles
//! as schema validation: a field whose value cannot be decoded is reported by
//! name, and field rules (`validator` attributes plus per-entity checks) run on
//! the decoded value.

use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::error::{Error, FieldErrors, Result};
use crate::store::{EntityStore, Store};

/// Fields the server always owns, whatever the caller sends.
pub const RESERVED_FIELDS: &[&str] = &["_id", "createdAt", "updatedAt"];

/// A document type persisted in its own collection and addressed by its
/// external identity.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Human-readable name used in messages ("Customer").
    const NAME: &'static str;

    /// Collection holding documents of this type.
    const COLLECTION: &'static str;

    /// Fields that must be present and non-blank strings on create.
    const REQUIRED_FIELDS: &'static [&'static str];

    /// Fields backed by a unique index.
    const UNIQUE_FIELDS: &'static [&'static str];

    /// The external identity used as lookup key.
    fn external_id(&self) -> &str;

    /// Values of the unique fields, in `UNIQUE_FIELDS` order.
    fn unique_values(&self) -> Vec<(&'static str, String)>;

    /// Server-computed fields set at creation. They replace any caller value.
    fn creation_defaults(payload: &Map<String, Value>, now: DateTime<Utc>)
        -> Result<Map<String, Value>>;

    /// Normalisations applied to every write (create and update).
    fn normalize(fields: &mut Map<String, Value>);

    /// Field rules beyond what decoding enforces.
    fn check(&self) -> std::result::Result<(), FieldErrors>;

    /// Pick this type's collection out of a store.
    fn select(store: &dyn Store) -> &dyn EntityStore<Self>;
}

/// Build a new document from a create payload.
///
/// Required fields are checked first; a failure lists exactly the missing
/// keys. Caller fields then overlay the schema defaults, except the
/// server-owned fields returned by [`Entity::creation_defaults`] and the
/// reserved identity/timestamp fields, which are always server-set.
pub fn build<T: Entity>(payload: Value, now: DateTime<Utc>) -> Result<T> {
    let payload = into_object(payload)?;
    check_required(T::REQUIRED_FIELDS, &payload)?;

    let mut base = Map::new();
    for key in T::REQUIRED_FIELDS {
        if let Some(value) = payload.get(*key) {
            base.insert((*key).to_string(), value.clone());
        }
    }
    base.extend(T::creation_defaults(&payload, now)?);
    base.insert("_id".to_string(), Value::String(ObjectId::new().to_hex()));
    base.insert("createdAt".to_string(), timestamp(now));
    base.insert("updatedAt".to_string(), timestamp(now));
    T::normalize(&mut base);

    let overlay: Map<String, Value> = payload
        .into_iter()
        .filter(|(key, _)| !base.contains_key(key))
        .collect();

    merge_validated(base, overlay)
}

/// Merge an update payload over a stored document.
///
/// Top-level caller fields replace stored ones. `_id` and `createdAt` are
/// preserved, `updatedAt` is refreshed and validation runs again on the
/// merged result.
pub fn apply_update<T: Entity>(existing: &T, patch: Value, now: DateTime<Utc>) -> Result<T> {
    let mut overlay = into_object(patch)?;
    for key in RESERVED_FIELDS {
        overlay.remove(*key);
    }
    T::normalize(&mut overlay);

    let mut base = match to_json(existing)? {
        Value::Object(map) => map,
        _ => {
            return Err(Error::Storage {
                message: format!("stored {} is not a document", T::NAME),
            })
        }
    };
    base.insert("updatedAt".to_string(), timestamp(now));

    merge_validated(base, overlay)
}

/// Check that every required field is a non-blank string.
pub fn check_required(required: &[&str], payload: &Map<String, Value>) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|key| !is_present(payload.get(**key)))
        .map(|key| (*key).to_string())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(Error::ValidationMissingField {
        missing,
        required: required.iter().map(|key| (*key).to_string()).collect(),
        received: payload.keys().cloned().collect(),
    })
}

fn is_present(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if !s.trim().is_empty())
}

fn into_object(payload: Value) -> Result<Map<String, Value>> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidPayload {
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode `base` overlaid with `overlay`, reporting failures per field.
///
/// `base` must decode on its own; each overlay key is probed against it so a
/// bad value is attributed to the key that carried it.
fn merge_validated<T: Entity>(base: Map<String, Value>, overlay: Map<String, Value>) -> Result<T> {
    let mut merged = base.clone();
    merged.extend(overlay.clone());

    let whole = match serde_json::from_value::<T>(Value::Object(merged)) {
        Ok(document) => {
            document
                .check()
                .map_err(|errors| Error::Validation { errors })?;
            return Ok(document);
        }
        Err(err) => err,
    };

    let mut errors = FieldErrors::new();
    for (key, value) in overlay {
        let mut probe = base.clone();
        probe.insert(key.clone(), value);
        if let Err(err) = serde_json::from_value::<T>(Value::Object(probe)) {
            errors.insert(key, err.to_string());
        }
    }
    if errors.is_empty() {
        errors.insert("document".to_string(), whole.to_string());
    }

    Err(Error::Validation { errors })
}

/// Flatten `validator` errors into dotted camelCase paths
/// (`rideHistory.0.rating`), keeping the first message per field.
pub fn flatten_validation(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    collect_validation("", errors, &mut out);
    out
}

fn collect_validation(prefix: &str, errors: &ValidationErrors, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let name = camel_case(&field.to_string());
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}.{name}")
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                if let Some(first) = list.first() {
                    let message = first
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", first.code));
                    out.insert(path, message);
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_validation(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validation(&format!("{path}.{index}"), inner, out);
                }
            }
        }
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Lowercase a string field in place.
pub(crate) fn lowercase_field(fields: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(s)) = fields.get_mut(key) {
        *s = s.to_lowercase();
    }
}

/// Uppercase a string field in place.
pub(crate) fn uppercase_field(fields: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(s)) = fields.get_mut(key) {
        *s = s.to_uppercase();
    }
}

/// Render a timestamp the way documents store it.
pub fn timestamp(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| Error::Storage {
        message: format!("failed to encode document: {err}"),
    })
}
