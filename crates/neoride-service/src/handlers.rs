//! Customer and driver resource handlers.
//!
//! One generic handler per operation, instantiated for each [`Entity`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use neoride_lib::{crud, Entity, Error};
use neoride_service_shared::{
    from_lib_error, record_entity_failure, record_entity_operation, AppState, JsonPayload,
    Operation, ProblemDetails, RequestId,
};

type HandlerResult<T> = Result<T, ProblemDetails>;

/// `POST /api/{collection}`
pub async fn create_entity<T: Entity>(
    State(state): State<AppState>,
    request_id: RequestId,
    JsonPayload(payload): JsonPayload,
) -> HandlerResult<(StatusCode, Json<T>)> {
    let external_id = payload
        .get("externalId")
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string();
    let email = payload
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string();
    info!(
        request_id = %request_id,
        entity = T::NAME,
        external_id = %external_id,
        email = %email,
        "creating document"
    );

    match crud::create::<T>(state.store(), payload).await {
        Ok(document) => {
            record_entity_operation(T::NAME, Operation::Create);
            Ok((StatusCode::CREATED, Json(document)))
        }
        Err(err) => Err(failure::<T>(Operation::Create, err, &request_id)),
    }
}

/// `GET /api/{collection}/{external_id}`
pub async fn get_entity<T: Entity>(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
    request_id: RequestId,
) -> HandlerResult<Json<T>> {
    match crud::get::<T>(state.store(), &external_id).await {
        Ok(document) => {
            record_entity_operation(T::NAME, Operation::Get);
            Ok(Json(document))
        }
        Err(err) => Err(failure::<T>(Operation::Get, err, &request_id)),
    }
}

/// `PUT /api/{collection}/{external_id}`
pub async fn update_entity<T: Entity>(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
    request_id: RequestId,
    JsonPayload(patch): JsonPayload,
) -> HandlerResult<Json<T>> {
    match crud::update::<T>(state.store(), &external_id, patch).await {
        Ok(document) => {
            record_entity_operation(T::NAME, Operation::Update);
            Ok(Json(document))
        }
        Err(err) => Err(failure::<T>(Operation::Update, err, &request_id)),
    }
}

/// `DELETE /api/{collection}/{external_id}`
pub async fn delete_entity<T: Entity>(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
    request_id: RequestId,
) -> HandlerResult<Json<Value>> {
    match crud::delete::<T>(state.store(), &external_id).await {
        Ok(_) => {
            record_entity_operation(T::NAME, Operation::Delete);
            Ok(Json(json!({ "message": crud::deleted_message::<T>() })))
        }
        Err(err) => Err(failure::<T>(Operation::Delete, err, &request_id)),
    }
}

/// Log, count and convert a failed operation.
fn failure<T: Entity>(operation: Operation, err: Error, request_id: &RequestId) -> ProblemDetails {
    record_entity_failure(T::NAME, operation, err.reason());

    if err.is_client_error() {
        warn!(
            request_id = %request_id,
            entity = T::NAME,
            operation = operation.as_str(),
            reason = err.reason(),
            error = %err,
            "request rejected"
        );
    } else {
        error!(
            request_id = %request_id,
            entity = T::NAME,
            operation = operation.as_str(),
            reason = err.reason(),
            error = %err,
            "operation failed"
        );
    }

    from_lib_error(&err, request_id.as_str())
}
