//! Origin Fetcher (C6).
//!
//! Iterates a matched origin's sources in priority order, applying each source's
//! auth strategy and a per-source timeout, stopping at the first `2xx`. Grounded on
//! the teacher's `api::gateway::ApiGateway::route_request` ordered-backend-iteration
//! loop, generalized from load-balanced backend selection to ordered source
//! fallback.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::AppError;
use crate::origin::auth;
use crate::origin::model::{MatchedOrigin, SourceConfig, SourceDescriptor};

const PER_SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// The result of a successful origin fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// The fetched body bytes.
    pub body: Bytes,
    /// Which source served it.
    pub source: SourceDescriptor,
    /// The (possibly signed) URL that was fetched, passed on to the Transform Client.
    pub original_url: String,
}

/// Abstraction over origin fetching, so the Cache Orchestrator and Retry/Failover
/// Coordinator depend on an interface rather than a concrete HTTP client.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Fetch the first reachable source for `origin`, skipping any priority listed
    /// in `exclude`.
    async fn fetch(
        &self,
        origin: &MatchedOrigin,
        exclude: &HashSet<u32>,
    ) -> Result<FetchOutcome, AppError>;
}

/// `reqwest`-backed implementation.
pub struct HttpOriginFetcher {
    client: reqwest::Client,
}

impl HttpOriginFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(PER_SOURCE_TIMEOUT)
                .build()
                .expect("reqwest client builds with default TLS backend"),
        }
    }

    async fn try_source(
        &self,
        origin: &MatchedOrigin,
        source: &SourceConfig,
    ) -> Option<FetchOutcome> {
        let raw_url = origin.expand_path_template(&source.path_template);
        let signer = auth::build(source.auth.as_ref());
        let signed = match signer.sign(&raw_url).await {
            Ok(signed) => signed,
            Err(err) => {
                tracing::warn!(source = source.kind.as_str(), error = %err, "signer failed");
                return None;
            }
        };

        let mut request = self
            .client
            .get(&signed.url)
            .timeout(PER_SOURCE_TIMEOUT);
        if let Some((name, value)) = &signed.extra_header {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(body) => Some(FetchOutcome {
                    body,
                    source: SourceDescriptor {
                        kind: source.kind,
                        priority: source.priority,
                    },
                    original_url: signed.url,
                }),
                Err(err) => {
                    tracing::warn!(source = source.kind.as_str(), error = %err, "body read failed");
                    None
                }
            },
            Ok(response) => {
                tracing::debug!(
                    source = source.kind.as_str(),
                    status = response.status().as_u16(),
                    "origin source declined"
                );
                None
            }
            Err(err) => {
                tracing::debug!(source = source.kind.as_str(), error = %err, "origin source unreachable");
                None
            }
        }
    }
}

impl Default for HttpOriginFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OriginFetcher for HttpOriginFetcher {
    async fn fetch(
        &self,
        origin: &MatchedOrigin,
        exclude: &HashSet<u32>,
    ) -> Result<FetchOutcome, AppError> {
        let mut sources: Vec<&SourceConfig> = origin
            .config
            .sources
            .iter()
            .filter(|s| !exclude.contains(&s.priority))
            .collect();
        sources.sort_by_key(|s| s.priority);

        if sources.is_empty() {
            return Err(AppError::NotFound(format!(
                "no remaining sources for origin '{}'",
                origin.config.name
            )));
        }

        let mut saw_any_failure = false;
        for source in sources {
            if let Some(outcome) = self.try_source(origin, source).await {
                return Ok(outcome);
            }
            saw_any_failure = true;
        }

        if saw_any_failure {
            Err(AppError::NotFound(format!(
                "all sources exhausted for origin '{}'",
                origin.config.name
            )))
        } else {
            Err(AppError::OriginUnavailable(format!(
                "origin '{}' has no reachable sources",
                origin.config.name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::model::{OriginConfig, SourceKind};

    fn origin_with_sources(sources: Vec<SourceConfig>) -> MatchedOrigin {
        MatchedOrigin {
            config: OriginConfig {
                name: "videos".to_string(),
                matcher: r"^/videos/(.+)$".to_string(),
                sources,
                ttl_overrides: None,
                transformation_overrides: None,
            },
            captures: vec!["sample.mp4".to_string()],
        }
    }

    #[test]
    fn expand_path_template_substitutes_captures() {
        let origin = origin_with_sources(vec![]);
        assert_eq!(
            origin.expand_path_template("https://bucket.example.com/{0}"),
            "https://bucket.example.com/sample.mp4"
        );
    }

    #[tokio::test]
    async fn empty_source_list_is_not_found() {
        let fetcher = HttpOriginFetcher::new();
        let origin = origin_with_sources(vec![SourceConfig {
            kind: SourceKind::R2,
            priority: 0,
            path_template: "{0}".to_string(),
            auth: None,
        }]);
        let mut exclude = HashSet::new();
        exclude.insert(0);
        let result = fetcher.fetch(&origin, &exclude).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
