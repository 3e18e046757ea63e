//! Pluggable origin URL signer contract.
//!
//! The actual presigning logic (STS-style bucket URLs, partner token issuance) is
//! an external collaborator out of scope for this system; what's in scope is the
//! trait boundary and the trivial implementations spec.md §3 names: none,
//! query-token, header-token. The contract is "produces a URL valid for >= 60s" —
//! callers don't re-sign mid-request.

use async_trait::async_trait;

use crate::error::AppError;
use crate::origin::model::AuthConfig;

/// A signed fetch: the URL to request and any extra header to attach.
#[derive(Debug, Clone)]
pub struct SignedFetch {
    /// The (possibly query-augmented) URL to fetch.
    pub url: String,
    /// An extra header to attach, if the auth strategy is header-based.
    pub extra_header: Option<(String, String)>,
}

/// Signs an origin URL before fetch, per a `Source`'s configured auth strategy.
#[async_trait]
pub trait OriginAuth: Send + Sync {
    /// Produce a signed fetch descriptor for `url`.
    async fn sign(&self, url: &str) -> Result<SignedFetch, AppError>;
}

/// No-op signer: the URL is used verbatim.
pub struct NoneAuth;

#[async_trait]
impl OriginAuth for NoneAuth {
    async fn sign(&self, url: &str) -> Result<SignedFetch, AppError> {
        Ok(SignedFetch {
            url: url.to_string(),
            extra_header: None,
        })
    }
}

/// Appends a fixed query parameter to the URL.
pub struct QueryTokenAuth {
    param: String,
    token: String,
}

#[async_trait]
impl OriginAuth for QueryTokenAuth {
    async fn sign(&self, url: &str) -> Result<SignedFetch, AppError> {
        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(SignedFetch {
            url: format!("{}{}{}={}", url, separator, self.param, self.token),
            extra_header: None,
        })
    }
}

/// Attaches a fixed header to the outbound fetch.
pub struct HeaderTokenAuth {
    header: String,
    token: String,
}

#[async_trait]
impl OriginAuth for HeaderTokenAuth {
    async fn sign(&self, url: &str) -> Result<SignedFetch, AppError> {
        Ok(SignedFetch {
            url: url.to_string(),
            extra_header: Some((self.header.clone(), self.token.clone())),
        })
    }
}

/// Build the signer for a configured auth strategy (or the no-op signer when absent).
pub fn build(config: Option<&AuthConfig>) -> Box<dyn OriginAuth> {
    match config {
        None | Some(AuthConfig::None) => Box::new(NoneAuth),
        Some(AuthConfig::QueryToken { param, token }) => Box::new(QueryTokenAuth {
            param: param.clone(),
            token: token.clone(),
        }),
        Some(AuthConfig::HeaderToken { header, token }) => Box::new(HeaderTokenAuth {
            header: header.clone(),
            token: token.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn none_auth_passes_url_through() {
        let signed = NoneAuth.sign("https://example.com/a.mp4").await.unwrap();
        assert_eq!(signed.url, "https://example.com/a.mp4");
        assert!(signed.extra_header.is_none());
    }

    #[tokio::test]
    async fn query_token_appends_param() {
        let auth = QueryTokenAuth {
            param: "token".to_string(),
            token: "abc123".to_string(),
        };
        let signed = auth.sign("https://example.com/a.mp4").await.unwrap();
        assert_eq!(signed.url, "https://example.com/a.mp4?token=abc123");
    }

    #[tokio::test]
    async fn query_token_uses_ampersand_when_query_exists() {
        let auth = QueryTokenAuth {
            param: "token".to_string(),
            token: "abc123".to_string(),
        };
        let signed = auth.sign("https://example.com/a.mp4?x=1").await.unwrap();
        assert_eq!(signed.url, "https://example.com/a.mp4?x=1&token=abc123");
    }

    #[tokio::test]
    async fn header_token_sets_extra_header() {
        let auth = HeaderTokenAuth {
            header: "X-Auth".to_string(),
            token: "secret".to_string(),
        };
        let signed = auth.sign("https://example.com/a.mp4").await.unwrap();
        assert_eq!(
            signed.extra_header,
            Some(("X-Auth".to_string(), "secret".to_string()))
        );
    }
}
