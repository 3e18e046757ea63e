//! `api::debug`: the `/debug` route contract.
//!
//! The debug HTML UI itself is an external static asset (spec.md §1 names it
//! out of scope), so this module only owns the route surface: when debug mode
//! is disabled in config, `/debug` 404s; when enabled, it serves a minimal
//! placeholder page rather than embedding a UI this crate doesn't own.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::api::state::AppState;

const PLACEHOLDER: &str = "<!doctype html><html><head><title>videogate debug</title></head>\
<body><p>Debug UI is served as an external static asset in production deployments.</p></body></html>";

/// `GET /debug`.
pub async fn debug_page(State(state): State<Arc<AppState>>) -> Response {
    if !state.config().debug.enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    Html(PLACEHOLDER).into_response()
}
