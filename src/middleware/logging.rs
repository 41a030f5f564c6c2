//! Request logging middleware.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Log method, path, status and latency for every request except `/health`.
///
/// Only the path is logged; query strings may carry session tokens.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == "/health" {
        return next.run(request).await;
    }

    let upgrade = request.headers().contains_key("upgrade");
    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(method = %method, path = %path, status, latency_ms, "Request failed (5xx)");
    } else if upgrade {
        info!(method = %method, path = %path, status, latency_ms, "Connection upgraded");
    } else {
        info!(method = %method, path = %path, status, latency_ms, "Request completed");
    }

    response
}
