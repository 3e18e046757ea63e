//! Ambient request middleware: request-ID assignment, structured request
//! logging, and security headers.
//!
//! Grounded on the teacher's `api::middleware` trio of
//! `request_id_middleware`/`request_logging_middleware`/`security_headers_middleware`.
//! The teacher's JWT auth, rate-limit, content-type-validation, and role-check
//! middleware have no counterpart here — this system takes no JSON request
//! bodies and has no user auth — so only the request-scoping and observability
//! layers carry over.

use std::time::Instant;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Request ID header name, echoed back on the response.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Assign a request ID (or propagate an inbound one) and store it in
/// extensions so `api::handlers` can read it back for C13 step 1.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Log request start/completion with the request ID, method, path, status, and
/// duration, the way the teacher's `request_logging_middleware` does.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<String>()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "request completed"
    );

    response
}

/// Attach the fixed set of security headers the teacher applies to every response.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'self'"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );

    response
}

/// Permissive CORS, matching the teacher's default `cors_layer()` — video bytes
/// are served to arbitrary players/embeds, not a single first-party origin.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::HEAD])
        .allow_headers([axum::http::header::RANGE, axum::http::header::CACHE_CONTROL])
        .expose_headers([
            axum::http::header::CONTENT_RANGE,
            axum::http::header::CONTENT_LENGTH,
            axum::http::header::ACCEPT_RANGES,
            HeaderValue::from_static("x-request-id"),
            HeaderValue::from_static("x-cache-source"),
            HeaderValue::from_static("x-cf-error-code"),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}
