//! Origin/source routing: the data model, the pluggable auth contract, the
//! Origin Fetcher (C6), and the Retry/Failover Coordinator (C8).

pub mod auth;
pub mod failover;
pub mod fetcher;
pub mod model;

use regex::Regex;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::origin::model::MatchedOrigin;

/// Match a request path against the configured origin list, first match wins.
pub fn match_origin(config: &AppConfig, path: &str) -> Result<MatchedOrigin, AppError> {
    for origin in &config.origins {
        let regex = Regex::new(&origin.matcher)
            .map_err(|err| AppError::Internal(format!("invalid matcher regex: {}", err)))?;
        if let Some(captures) = regex.captures(path) {
            let captured: Vec<String> = captures
                .iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect();
            return Ok(MatchedOrigin {
                config: origin.clone(),
                captures: captured,
            });
        }
    }
    Err(AppError::NotFound(format!("no origin matches path '{}'", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, DebugConfig, LoggingConfig, StorageConfig, TtlConfig, VideoDefaults};
    use crate::origin::model::{OriginConfig, SourceConfig, SourceKind};
    use std::collections::HashMap;

    fn config_with_origin(matcher: &str) -> AppConfig {
        AppConfig {
            version: 1,
            debug: DebugConfig::default(),
            logging: LoggingConfig::default(),
            cache: CacheConfig {
                ttl: TtlConfig {
                    ok: 1,
                    client_error: 1,
                    server_error: 1,
                    redirects: 1,
                },
                enable_versioning: true,
                enable_cache_tags: true,
                store_indefinitely: false,
                bypass_query_parameters: vec![],
            },
            video_defaults: VideoDefaults::default(),
            derivatives: HashMap::new(),
            responsive_breakpoints: HashMap::new(),
            origins: vec![OriginConfig {
                name: "videos".to_string(),
                matcher: matcher.to_string(),
                sources: vec![SourceConfig {
                    kind: SourceKind::R2,
                    priority: 0,
                    path_template: "{0}".to_string(),
                    auth: None,
                }],
                ttl_overrides: None,
                transformation_overrides: None,
            }],
            storage: StorageConfig {
                priority: vec!["r2".to_string()],
                kv_path: "./data/kv".to_string(),
                version_kv_path: "./data/version".to_string(),
            },
        }
    }

    #[test]
    fn matches_and_captures_groups() {
        let config = config_with_origin(r"^/videos/(.+)$");
        let matched = match_origin(&config, "/videos/sample.mp4").unwrap();
        assert_eq!(matched.captures, vec!["sample.mp4".to_string()]);
    }

    #[test]
    fn no_match_is_not_found() {
        let config = config_with_origin(r"^/videos/(.+)$");
        assert!(match_origin(&config, "/images/sample.png").is_err());
    }
}
