//! Request extractors.

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde_json::Value;

use crate::middleware::{extract_or_generate_request_id, RequestId};
use crate::ProblemDetails;

/// A JSON request body of any shape.
///
/// Unlike `Json<Value>`, a body that is not valid JSON (or not sent as JSON)
/// is rejected with a 400 [`ProblemDetails`] carrying the request ID. Shape
/// checks are left to the library so that every field error is reported the
/// same way.
#[derive(Debug, Clone)]
pub struct JsonPayload(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonPayload {
    type Rejection = ProblemDetails;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(|| extract_or_generate_request_id(req.headers()));

        match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "rejected request body");
                Err(
                    ProblemDetails::bad_request("Invalid JSON payload", request_id.as_str())
                        .with_detail(rejection.body_text()),
                )
            }
        }
    }
}
