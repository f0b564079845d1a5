//! NeoRide REST API.
//!
//! # Endpoints
//!
//! - `GET /` - Index of endpoints
//! - `GET /api/health` - Database ping
//! - `GET /api/debug` - Configuration presence and collection listing
//! - `GET /api/stats` - Customer and driver counts
//! - `POST /api/customers`, `GET|PUT|DELETE /api/customers/{externalId}`
//! - `POST /api/drivers`, `GET|PUT|DELETE /api/drivers/{externalId}`
//! - `GET /metrics` - Prometheus metrics endpoint

#![deny(warnings)]

pub mod handlers;
pub mod system;

use std::any::Any;

use axum::{
    http::{header::HeaderName, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};

use neoride_lib::{Customer, Driver};
use neoride_service_shared::{
    health, metrics_handler, AppState, MetricsConfig, ProblemDetails, RequestTrackingLayer,
    PROBLEM_INTERNAL_ERROR, REQUEST_ID_HEADER,
};

use handlers::{create_entity, delete_entity, get_entity, update_entity};

/// The full API with all middleware applied.
pub fn router(state: AppState, metrics: &MetricsConfig) -> Router {
    let mut routes = Router::new()
        .route("/", get(system::root))
        .route("/api/health", get(health))
        .route("/api/debug", get(system::debug))
        .route("/api/stats", get(system::stats))
        .route("/api/customers", post(create_entity::<Customer>))
        .route(
            "/api/customers/{external_id}",
            get(get_entity::<Customer>)
                .put(update_entity::<Customer>)
                .delete(delete_entity::<Customer>),
        )
        .route("/api/drivers", post(create_entity::<Driver>))
        .route(
            "/api/drivers/{external_id}",
            get(get_entity::<Driver>)
                .put(update_entity::<Driver>)
                .delete(delete_entity::<Driver>),
        );

    if metrics.enabled {
        routes = routes.route(&metrics.path, get(metrics_handler));
    }

    with_middleware(routes.fallback(system::not_found)).with_state(state)
}

/// Apply CORS, request tracking and panic handling to every route of `router`.
pub fn with_middleware<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AnyOrigin)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]);

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(RequestTrackingLayer)
        .layer(cors)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = message, "handler panicked");

    ProblemDetails::new(
        PROBLEM_INTERNAL_ERROR,
        "Internal Error",
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
    )
    .into_response()
}
