//! Response header assembly for the Pipeline Entry (C13 step 5).
//!
//! Trimmed relative to the teacher's `api::responses::ApiResponse<T>` — no HAL
//! links, no pagination envelope, no camelCase JSON body — because this system
//! serves raw video bytes, not a JSON API. What survives is the header-building
//! discipline: one small function per concern, assembled in a fixed order.

use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode};

use crate::cache::orchestrator::{CacheSource, OrchestratedResponse};

/// A single debug breadcrumb recorded during C13's pipeline walk.
#[derive(Debug, Clone)]
pub struct Breadcrumb {
    pub name: String,
    pub detail: String,
}

impl Breadcrumb {
    pub fn new(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: detail.into(),
        }
    }
}

/// Bound on the total bytes spent on `X-Breadcrumbs-*` headers, so a pathological
/// number of breadcrumbs can never blow out the response header budget.
const BREADCRUMB_HEADER_BUDGET: usize = 4096;

/// Build the success response for an `OrchestratedResponse`, attaching every
/// header spec.md §6/§4.13 calls for.
pub fn build_success_response(
    orchestrated: OrchestratedResponse,
    request_id: &str,
    cache_control_max_age: Option<u64>,
    breadcrumbs: &[Breadcrumb],
) -> Response<Body> {
    let status = match orchestrated.range {
        Some(_) => StatusCode::PARTIAL_CONTENT,
        None => StatusCode::OK,
    };

    let mut builder = Response::builder()
        .status(status)
        .header(axum::http::header::CONTENT_TYPE, orchestrated.content_type)
        .header(axum::http::header::CONTENT_LENGTH, orchestrated.body.len())
        .header(axum::http::header::ACCEPT_RANGES, "bytes")
        .header(super::middleware::REQUEST_ID_HEADER, request_id)
        .header(
            "X-Cache-Source",
            match orchestrated.cache_source {
                CacheSource::Kv => "kv",
                CacheSource::Origin => "origin",
            },
        );

    builder = apply_cache_control(builder, cache_control_max_age);

    if let Some((start, end, total)) = orchestrated.range {
        builder = builder.header(
            axum::http::header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, end, total),
        );
    }

    if let Some((failed, alternative)) = orchestrated.retry {
        builder = builder
            .header("X-Retry-Applied", "true")
            .header("X-Failed-Source", failed.kind.as_str())
            .header("X-Alternative-Source", alternative.kind.as_str());
    }

    builder = apply_breadcrumbs(builder, breadcrumbs);

    builder
        .body(Body::from(orchestrated.body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn apply_cache_control(
    builder: axum::http::response::Builder,
    max_age: Option<u64>,
) -> axum::http::response::Builder {
    match max_age {
        Some(seconds) => builder.header(
            axum::http::header::CACHE_CONTROL,
            format!("public, max-age={}", seconds),
        ),
        None => builder.header(axum::http::header::CACHE_CONTROL, "no-store"),
    }
}

/// Attach `X-Breadcrumbs-N: name=detail` headers until the bounded budget is
/// exhausted, per C13 step 5's "bounded header-size budget".
fn apply_breadcrumbs(
    mut builder: axum::http::response::Builder,
    breadcrumbs: &[Breadcrumb],
) -> axum::http::response::Builder {
    let mut spent = 0usize;
    for (i, crumb) in breadcrumbs.iter().enumerate() {
        let value = format!("{}={}", crumb.name, crumb.detail);
        if spent + value.len() > BREADCRUMB_HEADER_BUDGET {
            break;
        }
        spent += value.len();
        if let Ok(value) = HeaderValue::from_str(&value) {
            builder = builder.header(format!("X-Breadcrumbs-{}", i), value);
        }
    }
    builder
}

/// Derive the `Cache-Control` max-age for a successful response, honoring
/// `store_indefinitely` and any per-origin TTL override already merged by the
/// caller.
pub fn success_max_age(store_indefinitely: bool, ttl_ok_seconds: u64) -> Option<u64> {
    if store_indefinitely {
        None
    } else {
        Some(ttl_ok_seconds)
    }
}
