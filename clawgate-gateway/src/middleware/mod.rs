//! # Logging Middleware
//!
//! One `tower`-style middleware: structured request/response logging.
//! Capability authorization happens per-route inside the handlers (it
//! depends on the resolved action/resource, which isn't known until the
//! path is parsed), so there is no blanket auth middleware here.

use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;

    let latency = start.elapsed();
    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        latency_ms = latency.as_millis(),
        "request processed"
    );

    response
}
