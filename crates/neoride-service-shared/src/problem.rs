//! RFC 9457 Problem Details for HTTP APIs.
//!
//! Every failure body carries a human-readable `error` message alongside the
//! standard members, plus structured extension members where the failure
//! has them (`field`, `details`, `missing`/`required`/`received`).
//! See: <https://www.rfc-editor.org/rfc/rfc9457.html>

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use neoride_lib::{Error as LibError, FieldErrors};

/// Problem type URI for create payloads lacking required fields.
pub const PROBLEM_MISSING_FIELDS: &str = "/problems/missing-fields";

/// Problem type URI for schema validation failures.
pub const PROBLEM_VALIDATION: &str = "/problems/validation-error";

/// Problem type URI for uniqueness violations.
pub const PROBLEM_DUPLICATE_KEY: &str = "/problems/duplicate-key";

/// Problem type URI for unknown external identities.
pub const PROBLEM_NOT_FOUND: &str = "/problems/not-found";

/// Problem type URI for unknown routes.
pub const PROBLEM_ROUTE_NOT_FOUND: &str = "/problems/route-not-found";

/// Problem type URI for malformed request bodies.
pub const PROBLEM_INVALID_REQUEST: &str = "/problems/invalid-request";

/// Problem type URI for a missing database configuration.
pub const PROBLEM_CONFIGURATION: &str = "/problems/configuration-missing";

/// Problem type URI for an unreachable database.
pub const PROBLEM_DATABASE_UNAVAILABLE: &str = "/problems/database-unavailable";

/// Problem type URI for internal server errors.
pub const PROBLEM_INTERNAL_ERROR: &str = "/problems/internal-error";

/// Error body shared by every failing endpoint.
///
/// # Example
///
/// ```
/// use neoride_service_shared::{ProblemDetails, PROBLEM_NOT_FOUND};
/// use axum::http::StatusCode;
///
/// let problem = ProblemDetails::new(
///     PROBLEM_NOT_FOUND,
///     "Not Found",
///     StatusCode::NOT_FOUND,
///     "Customer not found",
/// )
/// .with_request_id("req-12345");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI reference identifying the problem type (relative).
    #[serde(rename = "type")]
    pub type_uri: String,

    /// Short, human-readable summary of the problem type.
    pub title: String,

    /// HTTP status code for this problem.
    pub status: u16,

    /// Human-readable message for this occurrence.
    pub error: String,

    /// Longer explanation, when one adds anything to `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// The request ID of the failing request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// The field whose uniqueness was violated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Per-field validation messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<FieldErrors>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<Vec<String>>,
}

impl ProblemDetails {
    pub fn new(
        type_uri: impl Into<String>,
        title: impl Into<String>,
        status: StatusCode,
        error: impl Into<String>,
    ) -> Self {
        Self {
            type_uri: type_uri.into(),
            title: title.into(),
            status: status.as_u16(),
            error: error.into(),
            detail: None,
            instance: None,
            field: None,
            details: None,
            missing: None,
            required: None,
            received: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set `instance` to the request ID.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.instance = Some(request_id.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: FieldErrors) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a 400 Bad Request problem for malformed input.
    pub fn bad_request(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INVALID_REQUEST,
            "Invalid Request",
            StatusCode::BAD_REQUEST,
            error,
        )
        .with_request_id(request_id)
    }

    /// Create a 400 problem listing missing create fields.
    pub fn missing_fields(
        missing: &[String],
        required: &[String],
        received: &[String],
        request_id: impl Into<String>,
    ) -> Self {
        let mut problem = Self::new(
            PROBLEM_MISSING_FIELDS,
            "Missing Required Fields",
            StatusCode::BAD_REQUEST,
            "Missing required fields",
        )
        .with_detail(format!("Missing: {}", missing.join(", ")))
        .with_request_id(request_id);
        problem.missing = Some(missing.to_vec());
        problem.required = Some(required.to_vec());
        problem.received = Some(received.to_vec());
        problem
    }

    /// Create a 400 problem with per-field validation messages.
    pub fn validation(errors: &FieldErrors, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_VALIDATION,
            "Validation Error",
            StatusCode::BAD_REQUEST,
            "Validation error",
        )
        .with_details(errors.clone())
        .with_request_id(request_id)
    }

    /// Create a 409 Conflict problem naming the duplicated field.
    pub fn duplicate(entity: &str, field: &str, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_DUPLICATE_KEY,
            "Duplicate Key",
            StatusCode::CONFLICT,
            format!("{entity} already exists"),
        )
        .with_detail(format!("A {entity} with this {field} already exists"))
        .with_field(field)
        .with_request_id(request_id)
    }

    /// Create a 404 problem for an unknown external identity.
    pub fn not_found(entity: &str, external_id: &str, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_NOT_FOUND,
            "Not Found",
            StatusCode::NOT_FOUND,
            format!("{entity} not found"),
        )
        .with_detail(format!("No {entity} with externalId '{external_id}'"))
        .with_request_id(request_id)
    }

    /// 500 for failures with no more specific problem type.
    pub fn internal_error(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INTERNAL_ERROR,
            "Internal Error",
            StatusCode::INTERNAL_SERVER_ERROR,
            error,
        )
        .with_request_id(request_id)
    }

    /// HTTP status for this problem.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl std::fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.error)
    }
}

impl std::error::Error for ProblemDetails {}

/// Serialised with `Content-Type: application/problem+json` and the problem's status.
impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut response = Json(&self).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );

        *response.status_mut() = status;
        response
    }
}

/// Map a library error onto its HTTP problem, tagged with `request_id`.
pub fn from_lib_error(error: &LibError, request_id: &str) -> ProblemDetails {
    match error {
        LibError::ValidationMissingField {
            missing,
            required,
            received,
        } => ProblemDetails::missing_fields(missing, required, received, request_id),
        LibError::Validation { errors } => ProblemDetails::validation(errors, request_id),
        LibError::InvalidPayload { message } => ProblemDetails::bad_request(message.clone(), request_id),
        LibError::DuplicateKey { entity, field } => {
            ProblemDetails::duplicate(entity, field, request_id)
        }
        LibError::NotFound {
            entity,
            external_id,
        } => ProblemDetails::not_found(entity, external_id, request_id),
        LibError::ConfigurationMissing { .. } => ProblemDetails::new(
            PROBLEM_CONFIGURATION,
            "Configuration Missing",
            StatusCode::INTERNAL_SERVER_ERROR,
            error.to_string(),
        )
        .with_request_id(request_id),
        LibError::ConnectionRefused { .. } | LibError::ConnectionExhausted { .. } => {
            ProblemDetails::new(
                PROBLEM_DATABASE_UNAVAILABLE,
                "Database Unavailable",
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
            )
            .with_request_id(request_id)
        }
        LibError::Storage { .. } => ProblemDetails::internal_error(error.to_string(), request_id),
    }
}
