//! Service-level endpoints: index, debug report, stats and the 404 fallback.

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info};

use neoride_lib::collect_stats;
use neoride_service_shared::{
    from_lib_error, record_database_state, timestamp_now, AppState, ProblemDetails, RequestId,
    PROBLEM_ROUTE_NOT_FOUND,
};

/// Routes advertised by the index and the fallback.
pub const AVAILABLE_ROUTES: [&str; 5] = [
    "/api/health",
    "/api/debug",
    "/api/customers",
    "/api/drivers",
    "/api/stats",
];

#[derive(Debug, Serialize)]
struct Endpoints {
    health: &'static str,
    debug: &'static str,
    customers: &'static str,
    drivers: &'static str,
    stats: &'static str,
}

#[derive(Debug, Serialize)]
struct Index {
    message: &'static str,
    endpoints: Endpoints,
    timestamp: String,
}

/// `GET /`
pub async fn root() -> impl IntoResponse {
    Json(Index {
        message: "NeoRide Backend API is running",
        endpoints: Endpoints {
            health: AVAILABLE_ROUTES[0],
            debug: AVAILABLE_ROUTES[1],
            customers: AVAILABLE_ROUTES[2],
            drivers: AVAILABLE_ROUTES[3],
            stats: AVAILABLE_ROUTES[4],
        },
        timestamp: timestamp_now(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugReport {
    environment: String,
    mongodb_uri: &'static str,
    port: u16,
    database: String,
    mongo_state: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    collections: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collections_error: Option<String>,
    timestamp: String,
}

/// `GET /api/debug`
///
/// Always 200. A failed collection listing is reported in the body.
pub async fn debug(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store();
    let config = state.config();

    let (collections, collections_error) = match store.collection_names().await {
        Ok(names) => (Some(names), None),
        Err(err) => (None, Some(err.to_string())),
    };
    let ready = store.ready_state();
    record_database_state(ready);

    Json(DebugReport {
        environment: config.environment.clone(),
        mongodb_uri: config.uri_status(),
        port: config.port,
        database: store.database_name().to_string(),
        mongo_state: ready.code(),
        collections,
        collections_error,
        timestamp: timestamp_now(),
    })
}

/// `GET /api/stats`
pub async fn stats(State(state): State<AppState>, request_id: RequestId) -> Response {
    match collect_stats(state.store()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => {
            error!(request_id = %request_id, reason = err.reason(), error = %err, "stats query failed");
            from_lib_error(&err, request_id.as_str()).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteNotFound {
    #[serde(flatten)]
    problem: ProblemDetails,
    requested_path: String,
    available_routes: [&'static str; 5],
    timestamp: String,
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri, request_id: RequestId) -> Response {
    let requested_path = requested_path(&uri);
    info!(request_id = %request_id, path = %requested_path, "route not found");

    let body = RouteNotFound {
        problem: ProblemDetails::new(
            PROBLEM_ROUTE_NOT_FOUND,
            "Route Not Found",
            StatusCode::NOT_FOUND,
            "Route not found",
        )
        .with_request_id(request_id.as_str()),
        requested_path,
        available_routes: AVAILABLE_ROUTES,
        timestamp: timestamp_now(),
    };

    let mut response = (StatusCode::NOT_FOUND, Json(body)).into_response();
    response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("application/problem+json"),
    );
    response
}

/// Path and query of the request, without scheme or authority. Requests in
/// absolute form (HTTP/2, proxies) carry both.
fn requested_path(uri: &Uri) -> String {
    uri.path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string())
}
