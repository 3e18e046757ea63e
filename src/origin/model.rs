//! Origin/Source routing model (spec.md §3 "Origin", "Source").

use serde::{Deserialize, Serialize};

use crate::config::TtlConfig;

/// One of the three source kinds a `Source` can be backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Object storage bucket, fetched directly.
    #[serde(alias = "bucket")]
    R2,
    /// A remote HTTP origin.
    #[serde(alias = "http")]
    Remote,
    /// A fallback HTTP origin, tried only after the primary remote fails.
    Fallback,
}

impl SourceKind {
    /// Lower-case identifier used in `X-Failed-Source` / `X-Alternative-Source` headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::R2 => "r2",
            SourceKind::Remote => "remote",
            SourceKind::Fallback => "fallback",
        }
    }
}

/// Auth strategy attached to a `Source`. The signer contract is "produces a URL
/// valid for >= 60s"; the actual presign logic for header/query tokens lives
/// behind [`crate::origin::auth::OriginAuth`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication; the URL is used as-is.
    None,
    /// Append a fixed query parameter (e.g. a signed token) to the URL.
    QueryToken {
        /// Query parameter name.
        param: String,
        /// Token value (opaque; presign logic outside this system's scope).
        token: String,
    },
    /// Attach a fixed header to the outbound fetch.
    HeaderToken {
        /// Header name.
        header: String,
        /// Header value.
        token: String,
    },
}

/// One entry in an `Origin`'s ordered source list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source kind.
    pub kind: SourceKind,
    /// Ascending priority; lower values are tried first.
    pub priority: u32,
    /// Path template referencing matcher capture groups (`{0}`, `{1}`, ...).
    pub path_template: String,
    /// Optional auth strategy.
    pub auth: Option<AuthConfig>,
}

/// A declarative routing rule matched against the inbound request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Origin name, used in logs and diagnostics.
    pub name: String,
    /// Regex with capture groups matched against the request path.
    pub matcher: String,
    /// Ordered candidate sources.
    pub sources: Vec<SourceConfig>,
    /// Optional per-status-class TTL overrides for this origin.
    pub ttl_overrides: Option<TtlConfig>,
    /// Optional path-pattern transformation overrides (Option Resolver precedence
    /// level 3), applied below derivative defaults and above mode defaults.
    #[serde(default)]
    pub transformation_overrides: Option<crate::options::resolver::TransformationOverrides>,
}

/// The result of matching an inbound path against the configured origin list.
#[derive(Debug, Clone)]
pub struct MatchedOrigin {
    /// The matched origin configuration.
    pub config: OriginConfig,
    /// Captured regex groups, indexed as `{0}`, `{1}`, ...
    pub captures: Vec<String>,
}

impl MatchedOrigin {
    /// Expand a source's path template with this match's captures.
    pub fn expand_path_template(&self, template: &str) -> String {
        let mut result = template.to_string();
        for (i, capture) in self.captures.iter().enumerate() {
            result = result.replace(&format!("{{{}}}", i), capture);
        }
        result
    }
}

/// Identifies which source ultimately served a request, recorded in metadata and
/// surfaced on retry/failover response headers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source kind.
    pub kind: SourceKind,
    /// The priority of this source within its origin, used as the exclusion key
    /// on retry since `(origin.name, source.kind, source.priority)` is unique.
    pub priority: u32,
}
