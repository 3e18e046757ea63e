//! Transform Client (C7): builds the upstream transform URL, performs the fetch,
//! and interprets the numeric error-code header via a static table.
//!
//! Grounded on the teacher's `api::gateway::GatewayError` taxonomy (a fixed
//! enum of failure kinds, each carrying a retryable flag) and its
//! `RetryPolicy::execute` backoff idiom, generalized here from inter-service
//! gateway calls to a single external media-transformation dependency.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use thiserror::Error;

use crate::options::TransformOptions;

/// Upstream fetches inherit the request deadline but always get at least this long.
const MIN_TRANSFORM_TIMEOUT: Duration = Duration::from_secs(30);

/// Semantic category of an upstream transform failure, independent of the exact
/// numeric code the upstream happens to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// Requested output exceeds the upstream's maximum input/output size.
    InputTooLarge,
    /// Requested clip duration exceeds the upstream's maximum.
    DurationTooLong,
    /// Parameters the upstream rejected as malformed.
    InvalidInput,
    /// The upstream timed out servicing the request.
    RequestTimeout,
    /// The upstream is rate-limiting this caller.
    RateLimited,
    /// An unspecified upstream internal failure.
    InternalError,
    /// The upstream could not reach the origin URL it was given.
    OriginUnreachable,
    /// A code outside the known table.
    Unknown,
}

struct ErrorCodeEntry {
    code: u32,
    kind: TransformErrorKind,
    retryable: bool,
    message: &'static str,
}

/// Static mapping from the upstream's numeric error header to a semantic kind,
/// a retryability flag, and a client-safe message — spec.md §4.7's "static table".
const ERROR_CODE_TABLE: &[ErrorCodeEntry] = &[
    ErrorCodeEntry {
        code: 9400,
        kind: TransformErrorKind::InputTooLarge,
        retryable: false,
        message: "requested output exceeds the maximum supported size",
    },
    ErrorCodeEntry {
        code: 9401,
        kind: TransformErrorKind::InvalidInput,
        retryable: false,
        message: "transform parameters were rejected as invalid",
    },
    ErrorCodeEntry {
        code: 9402,
        kind: TransformErrorKind::DurationTooLong,
        retryable: false,
        message: "requested clip duration exceeds the maximum supported",
    },
    ErrorCodeEntry {
        code: 9408,
        kind: TransformErrorKind::RequestTimeout,
        retryable: true,
        message: "upstream transform timed out",
    },
    ErrorCodeEntry {
        code: 9429,
        kind: TransformErrorKind::RateLimited,
        retryable: true,
        message: "upstream transform is rate limiting this request",
    },
    ErrorCodeEntry {
        code: 9500,
        kind: TransformErrorKind::InternalError,
        retryable: true,
        message: "upstream transform reported an internal error",
    },
    ErrorCodeEntry {
        code: 9502,
        kind: TransformErrorKind::OriginUnreachable,
        retryable: true,
        message: "upstream transform could not reach the origin URL",
    },
];

/// Look up the semantic kind, retryability, and message for an upstream error code.
/// Codes outside the table are treated as non-retryable unknowns.
pub fn lookup(code: u32) -> (TransformErrorKind, bool, &'static str) {
    match ERROR_CODE_TABLE.iter().find(|e| e.code == code) {
        Some(entry) => (entry.kind, entry.retryable, entry.message),
        None => (TransformErrorKind::Unknown, false, "unrecognized upstream error"),
    }
}

/// A typed transform failure.
#[derive(Error, Debug, Clone)]
#[error("transform failed (code {code}): {message}")]
pub struct TransformError {
    /// Numeric error code extracted from the upstream's error header.
    pub code: u32,
    /// Semantic kind.
    pub kind: TransformErrorKind,
    /// Whether this class of failure is worth retrying with an alternate source.
    pub retryable: bool,
    /// Client-safe message.
    pub message: String,
}

/// A request to the upstream transform endpoint.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// The origin URL, already fetched/validated by the Origin Fetcher.
    pub origin_url: String,
    /// Fully resolved transform options.
    pub options: TransformOptions,
}

/// A successful transform response.
#[derive(Debug, Clone)]
pub struct TransformResponse {
    /// Transformed body bytes.
    pub body: Bytes,
    /// Content type reported by the upstream.
    pub content_type: String,
}

/// Abstraction over the upstream transform call, so the Cache Orchestrator and
/// Retry/Failover Coordinator depend on an interface rather than a concrete client.
#[async_trait]
pub trait TransformClient: Send + Sync {
    /// Perform the transform, returning the transformed body or a typed error.
    async fn transform(&self, request: &TransformRequest) -> Result<TransformResponse, TransformError>;
}

/// Build the upstream URL per spec.md §4.7:
/// `{basePath}/{param=value,...}/{encodedOriginUrl}[?v=N]`.
///
/// Parameters are emitted in fixed order and only when non-default; `version` is
/// appended as `?v=N` only when greater than 1 — it is the sole upstream
/// cache-invalidation mechanism.
pub fn build_url(base_path: &str, request: &TransformRequest) -> String {
    let opts = &request.options;
    let mut params = Vec::new();
    if let Some(w) = opts.width {
        params.push(format!("w={}", w));
    }
    if let Some(h) = opts.height {
        params.push(format!("h={}", h));
    }
    if let Some(f) = &opts.format {
        params.push(format!("f={}", f));
    }
    if let Some(q) = &opts.quality {
        params.push(format!("q={}", q));
    }
    if let Some(c) = &opts.compression {
        params.push(format!("c={}", c));
    }
    if let Some(t) = &opts.time {
        params.push(format!("t={}", t));
    }
    if let Some(d) = &opts.duration {
        params.push(format!("d={}", d));
    }
    if let Some(cols) = opts.cols {
        params.push(format!("cols={}", cols));
    }
    if let Some(rows) = opts.rows {
        params.push(format!("rows={}", rows));
    }
    if let Some(interval) = &opts.interval {
        params.push(format!("interval={}", interval));
    }

    let param_segment = params.join(",");
    let encoded_url =
        utf8_percent_encode(&request.origin_url, NON_ALPHANUMERIC).to_string();

    let mut url = format!(
        "{}/{}/{}",
        base_path.trim_end_matches('/'),
        param_segment,
        encoded_url
    );
    if opts.version > 1 {
        url.push_str(&format!("?v={}", opts.version));
    }
    url
}

/// Error header name the upstream uses to report a failed transform.
const ERROR_HEADER: &str = "Cf-Resized";

/// `reqwest`-backed implementation.
pub struct HttpTransformClient {
    client: reqwest::Client,
    base_path: String,
}

impl HttpTransformClient {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(MIN_TRANSFORM_TIMEOUT)
                .build()
                .expect("reqwest client builds with default TLS backend"),
            base_path: base_path.into(),
        }
    }
}

#[async_trait]
impl TransformClient for HttpTransformClient {
    async fn transform(&self, request: &TransformRequest) -> Result<TransformResponse, TransformError> {
        let url = build_url(&self.base_path, request);

        let response = self
            .client
            .get(&url)
            .timeout(MIN_TRANSFORM_TIMEOUT)
            .send()
            .await
            .map_err(|err| TransformError {
                code: 0,
                kind: TransformErrorKind::OriginUnreachable,
                retryable: true,
                message: format!("upstream request failed: {}", err),
            })?;

        if response.status().is_success() {
            let content_type = response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = response.bytes().await.map_err(|err| TransformError {
                code: 0,
                kind: TransformErrorKind::InternalError,
                retryable: true,
                message: format!("failed reading upstream body: {}", err),
            })?;
            return Ok(TransformResponse { body, content_type });
        }

        let code = response
            .headers()
            .get(ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        let (kind, retryable, message) = lookup(code);
        Err(TransformError {
            code,
            kind,
            retryable,
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{TransformMode, TransformOptions};

    fn options() -> TransformOptions {
        TransformOptions {
            width: Some(1280),
            height: Some(720),
            quality: Some("high".to_string()),
            version: 1,
            ..TransformOptions::default()
        }
    }

    #[test]
    fn build_url_omits_version_when_one() {
        let request = TransformRequest {
            origin_url: "https://example.com/a.mp4".to_string(),
            options: options(),
        };
        let url = build_url("https://transform.example.com", &request);
        assert!(!url.contains("?v="));
        assert!(url.contains("w=1280,h=720"));
    }

    #[test]
    fn build_url_appends_version_when_above_one() {
        let mut opts = options();
        opts.version = 2;
        let request = TransformRequest {
            origin_url: "https://example.com/a.mp4".to_string(),
            options: opts,
        };
        let url = build_url("https://transform.example.com", &request);
        assert!(url.ends_with("?v=2"));
    }

    #[test]
    fn build_url_percent_encodes_origin_url() {
        let request = TransformRequest {
            origin_url: "https://example.com/a b.mp4".to_string(),
            options: TransformOptions::default(),
        };
        let url = build_url("https://transform.example.com", &request);
        assert!(!url.contains(' '));
    }

    #[test]
    fn lookup_retryable_codes() {
        let (kind, retryable, _) = lookup(9429);
        assert_eq!(kind, TransformErrorKind::RateLimited);
        assert!(retryable);
    }

    #[test]
    fn lookup_unknown_code_is_not_retryable() {
        let (kind, retryable, _) = lookup(1);
        assert_eq!(kind, TransformErrorKind::Unknown);
        assert!(!retryable);
    }

    #[test]
    fn param_order_is_fixed() {
        let mut opts = options();
        opts.compression = Some("high".to_string());
        opts.format = Some("mp4".to_string());
        let request = TransformRequest {
            origin_url: "https://example.com/a.mp4".to_string(),
            options: opts,
        };
        let url = build_url("https://transform.example.com", &request);
        let segment = url.split('/').nth(3).unwrap();
        assert_eq!(segment, "w=1280,h=720,f=mp4,q=high,c=high");
    }
}
