use std::collections::BTreeMap;

use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

/// Convenient result alias for the NeoRide library.
pub type Result<T> = std::result::Result<T, Error>;

/// Field name to human-readable validation message.
pub type FieldErrors = BTreeMap<String, String>;

/// MongoDB server error code for a unique index violation.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The database connection string is not configured. Never retried.
    #[error("database connection string is not configured (set {variable})")]
    ConfigurationMissing { variable: String },

    /// A single connection attempt failed at the driver level.
    #[error("database connection refused: {message}")]
    ConnectionRefused { message: String },

    /// Every allowed connection attempt failed.
    #[error("database connection failed after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    /// One or more required create fields were absent or blank.
    #[error("missing required fields: {}", .missing.join(", "))]
    ValidationMissingField {
        missing: Vec<String>,
        required: Vec<String>,
        received: Vec<String>,
    },

    /// Schema validation failed for one or more fields.
    #[error("validation failed: {}", format_field_errors(.errors))]
    Validation { errors: FieldErrors },

    /// A uniqueness constraint was violated.
    #[error("{entity} already exists (duplicate {field})")]
    DuplicateKey { entity: &'static str, field: String },

    /// No document matched the external identity.
    #[error("{entity} not found")]
    NotFound {
        entity: &'static str,
        external_id: String,
    },

    /// The request body was not a usable JSON object.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Any other storage failure, carrying the raw driver message.
    #[error("{message}")]
    Storage { message: String },
}

impl Error {
    /// Stable snake_case label for metrics and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::ConfigurationMissing { .. } => "configuration_missing",
            Error::ConnectionRefused { .. } => "connection_refused",
            Error::ConnectionExhausted { .. } => "connection_exhausted",
            Error::ValidationMissingField { .. } => "missing_field",
            Error::Validation { .. } => "validation_error",
            Error::DuplicateKey { .. } => "duplicate_key",
            Error::NotFound { .. } => "not_found",
            Error::InvalidPayload { .. } => "invalid_payload",
            Error::Storage { .. } => "storage_error",
        }
    }

    /// True for failures the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::ValidationMissingField { .. }
                | Error::Validation { .. }
                | Error::DuplicateKey { .. }
                | Error::NotFound { .. }
                | Error::InvalidPayload { .. }
        )
    }

    /// Build a validation error for a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), message.into());
        Error::Validation { errors }
    }

    /// Classify a driver error raised while operating on `entity` documents.
    pub fn from_mongo(entity: &'static str, err: mongodb::error::Error) -> Self {
        match duplicate_key_message(&err) {
            Some(message) => Error::DuplicateKey {
                entity,
                field: duplicate_key_field(&message),
            },
            None => Error::Storage {
                message: err.to_string(),
            },
        }
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Error::from_mongo("Document", err)
    }
}

/// Returns the server message when `err` is a unique index violation.
fn duplicate_key_message(err: &mongodb::error::Error) -> Option<String> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE =>
        {
            Some(write_error.message.clone())
        }
        ErrorKind::Command(command_error) if command_error.code == DUPLICATE_KEY_CODE => {
            Some(command_error.message.clone())
        }
        _ => None,
    }
}

/// Extract the offending field from an E11000 server message.
///
/// Understands both `dup key: { email: "a@b.com" }` and the index name form
/// `index: email_1`. Returns `"unknown"` when neither is present.
pub fn duplicate_key_field(message: &str) -> String {
    if let Some(rest) = message.split("dup key: {").nth(1) {
        if let Some(field) = rest.split(':').next() {
            let field = field.trim().trim_matches('"');
            if !field.is_empty() {
                return field.to_string();
            }
        }
    }

    if let Some(rest) = message.split("index: ").nth(1) {
        if let Some(index) = rest.split_whitespace().next() {
            let field = index.strip_suffix("_1").unwrap_or(index);
            if !field.is_empty() {
                return field.to_string();
            }
        }
    }

    "unknown".to_string()
}

fn format_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}
