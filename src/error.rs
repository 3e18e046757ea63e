//! Crate-wide error taxonomy.
//!
//! One variant per error kind in the propagation table: `BadRequest`, `NotFound`,
//! `PreconditionFailed`, `OriginUnavailable`, `UpstreamTransformFailed`,
//! `KvStoreFailed`, `Cancelled`. Every variant maps to an HTTP status and never
//! leaks internal detail (stack traces, backend error text) to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level application error.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Invalid parameter value or unsupported mode.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// All candidate sources returned 404 and no retry path yielded a 2xx.
    #[error("not found: {0}")]
    NotFound(String),

    /// Body exceeded the configured upper bound.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Non-404 source failures exhausted every candidate source.
    #[error("origin unavailable: {0}")]
    OriginUnavailable(String),

    /// Non-retryable error surfaced by the upstream transform endpoint.
    #[error("upstream transform failed (code {code}): {message}")]
    UpstreamTransformFailed {
        /// Numeric error code from the upstream's error header.
        code: u32,
        /// Human-readable message, safe to surface to the client.
        message: String,
        /// Whether the caller already retried with an alternate source.
        retryable: bool,
    },

    /// KV write failed after retries. Never surfaced as a failing response —
    /// the client has already received its bytes by the time this fires — but
    /// modeled here so background write-back can log it uniformly.
    #[error("kv store failed: {0}")]
    KvStoreFailed(String),

    /// Client disconnected mid-stream; no response body to send.
    #[error("request cancelled")]
    Cancelled,

    /// Catch-all for unexpected internal failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BadRequest",
            AppError::NotFound(_) => "NotFound",
            AppError::PreconditionFailed(_) => "PreconditionFailed",
            AppError::OriginUnavailable(_) => "OriginUnavailable",
            AppError::UpstreamTransformFailed { .. } => "UpstreamTransformFailed",
            AppError::KvStoreFailed(_) => "KvStoreFailed",
            AppError::Cancelled => "Cancelled",
            AppError::Internal(_) => "Internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PreconditionFailed(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::OriginUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamTransformFailed { code, .. } => {
                transform_status_for_code(*code)
            }
            AppError::KvStoreFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attach a request ID, producing the response body the pipeline entry emits.
    pub fn into_response_with_request_id(self, request_id: impl Into<String>) -> Response {
        let status = self.status();
        let code_header = match &self {
            AppError::UpstreamTransformFailed { code, .. } => Some(*code),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
                request_id: request_id.into(),
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(code) = code_header {
            if let Ok(value) = axum::http::HeaderValue::from_str(&code.to_string()) {
                response.headers_mut().insert("X-CF-Error-Code", value);
            }
        }
        response
    }
}

fn transform_status_for_code(code: u32) -> StatusCode {
    use crate::transform::client::TransformErrorKind;
    let (kind, _, _) = crate::transform::client::lookup(code);
    match kind {
        TransformErrorKind::InputTooLarge
        | TransformErrorKind::InvalidInput
        | TransformErrorKind::DurationTooLong => StatusCode::BAD_REQUEST,
        TransformErrorKind::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
        TransformErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        TransformErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        TransformErrorKind::OriginUnreachable | TransformErrorKind::Unknown => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl From<crate::transform::client::TransformError> for AppError {
    fn from(err: crate::transform::client::TransformError) -> Self {
        AppError::UpstreamTransformFailed {
            code: err.code,
            message: err.message,
            retryable: err.retryable,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with_request_id("unknown")
    }
}

/// `{error: {kind, message, requestId}}` response body, per the error-handling design.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
    #[serde(rename = "requestId")]
    request_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let err = AppError::BadRequest("bad width".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "BadRequest");
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn precondition_failed_maps_to_413() {
        assert_eq!(
            AppError::PreconditionFailed("too big".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn retryable_transform_error_still_surfaces_code() {
        let err = AppError::UpstreamTransformFailed {
            code: 9429,
            message: "rate limited".into(),
            retryable: true,
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
