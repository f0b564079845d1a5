//! Request tracking: correlation IDs, per-request spans and HTTP metrics.
//!
//! [`RequestTrackingLayer`] is mounted with `Router::layer`, so it runs after
//! routing and can label requests with their route template
//! (`/api/customers/{external_id}`) instead of the raw path. Requests that
//! matched no route share the `unmatched` label.
//!
//! Metrics recorded:
//! - `http_requests_total{method,path,status}` (status as `2xx`..`5xx`)
//! - `http_request_duration_seconds{method,path}`
//! - `http_request_size_bytes` / `http_response_size_bytes{method,path}`,
//!   when a `Content-Length` is present

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::{FromRequestParts, MatchedPath};
use axum::http::{header, request::Parts, HeaderMap, HeaderValue, Request, Response};
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use tracing::{info_span, Span};
use uuid::Uuid;

use crate::metrics::HTTP_REQUEST_DURATION;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const UNMATCHED_ROUTE: &str = "unmatched";

/// Correlation ID of one request. Reported as `instance` on problem bodies
/// and echoed in the `x-request-id` response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh time-sortable UUID v7.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Handlers get the ID the tracking layer assigned. Without the layer the
/// ID is taken from the headers or generated.
impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<RequestId>() {
            return Ok(id.clone());
        }
        Ok(extract_or_generate_request_id(&parts.headers))
    }
}

/// The caller's non-empty `x-request-id`, or a new UUID v7.
pub fn extract_or_generate_request_id(headers: &HeaderMap) -> RequestId {
    match headers.get(REQUEST_ID_HEADER).map(HeaderValue::to_str) {
        Some(Ok(id)) if !id.is_empty() => RequestId::from(id),
        _ => RequestId::generate(),
    }
}

fn status_class(status: u16) -> &'static str {
    match status / 100 {
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "other",
    }
}

fn content_length(headers: &HeaderMap) -> Option<f64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// What the layer knows about a request while it is in flight.
#[derive(Debug, Clone)]
struct RequestMeta {
    method: String,
    route: String,
    request_id: RequestId,
    started: Instant,
}

impl RequestMeta {
    fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().to_string(),
            route: req
                .extensions()
                .get::<MatchedPath>()
                .map_or_else(|| UNMATCHED_ROUTE.to_string(), |m| m.as_str().to_string()),
            request_id: extract_or_generate_request_id(req.headers()),
            started: Instant::now(),
        }
    }

    fn span(&self, uri: &axum::http::Uri) -> Span {
        info_span!(
            "request",
            request_id = %self.request_id,
            method = %self.method,
            path = %self.route,
            uri = %uri,
        )
    }

    fn record_size(&self, metric: &'static str, headers: &HeaderMap) {
        if let Some(size) = content_length(headers) {
            metrics::histogram!(
                metric,
                "method" => self.method.clone(),
                "path" => self.route.clone()
            )
            .record(size);
        }
    }

    /// Record duration and outcome. `status` is `None` when the inner
    /// service failed without producing a response.
    fn finish(&self, status: Option<u16>) {
        let elapsed = self.started.elapsed().as_secs_f64();
        metrics::histogram!(
            HTTP_REQUEST_DURATION,
            "method" => self.method.clone(),
            "path" => self.route.clone()
        )
        .record(elapsed);

        let class = status.map_or("5xx", status_class);
        metrics::counter!(
            "http_requests_total",
            "method" => self.method.clone(),
            "path" => self.route.clone(),
            "status" => class
        )
        .increment(1);

        let latency_ms = elapsed * 1000.0;
        match status {
            Some(code) if code >= 500 => {
                tracing::warn!(status = code, latency_ms, "request completed with server error")
            }
            Some(code) => tracing::info!(status = code, latency_ms, "request completed"),
            None => tracing::error!(latency_ms, "request failed"),
        }
    }
}

/// Assigns request IDs, opens the request span and records HTTP metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestTrackingLayer;

impl<S> Layer<S> for RequestTrackingLayer {
    type Service = RequestTracking<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTracking { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestTracking<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestTracking<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: http_body::Body + Send + 'static,
    ResBody: http_body::Body + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = TrackedFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let meta = RequestMeta::from_request(&req);
        meta.record_size("http_request_size_bytes", req.headers());
        req.extensions_mut().insert(meta.request_id.clone());

        let span = meta.span(req.uri());
        span.in_scope(|| tracing::debug!("handling request"));

        TrackedFuture {
            inner: self.inner.call(req),
            meta,
            span,
        }
    }
}

pin_project! {
    /// Response future that finishes the request's metrics and echoes its ID.
    pub struct TrackedFuture<F> {
        #[pin]
        inner: F,
        meta: RequestMeta,
        span: Span,
    }
}

impl<F, ResBody, E> Future for TrackedFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    ResBody: http_body::Body,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _entered = this.span.enter();

        let mut result = match this.inner.poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };

        match &mut result {
            Ok(response) => {
                this.meta
                    .record_size("http_response_size_bytes", response.headers());
                if let Ok(value) = HeaderValue::from_str(this.meta.request_id.as_str()) {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                this.meta.finish(Some(response.status().as_u16()));
            }
            Err(_) => this.meta.finish(None),
        }

        Poll::Ready(result)
    }
}
