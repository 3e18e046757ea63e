//! Router assembly, grounded on the teacher's `create_v1_router`/`create_app_router`
//! layering: one wildcard video-serving route plus the ambient `/healthz` and
//! `/debug` routes, wrapped in the same middleware order the teacher uses
//! (request ID, security headers, logging, then CORS).

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::api::debug::debug_page;
use crate::api::handlers::{healthz, serve_video};
use crate::api::middleware::{
    cors_layer, request_id_middleware, request_logging_middleware, security_headers_middleware,
};
use crate::api::state::AppState;

/// Build the full application router.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/debug", get(debug_page))
        .route("/*path", get(serve_video))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(axum::middleware::from_fn(request_logging_middleware))
        .layer(cors_layer())
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config() -> crate::config::AppConfig {
        crate::config::AppConfig {
            version: 1,
            debug: Default::default(),
            logging: Default::default(),
            cache: crate::config::CacheConfig {
                ttl: crate::config::TtlConfig { ok: 1, client_error: 1, server_error: 1, redirects: 1 },
                enable_versioning: true,
                enable_cache_tags: true,
                store_indefinitely: false,
                bypass_query_parameters: vec![],
            },
            video_defaults: Default::default(),
            derivatives: std::collections::HashMap::new(),
            responsive_breakpoints: std::collections::HashMap::new(),
            origins: vec![],
            storage: crate::config::StorageConfig {
                priority: vec![],
                kv_path: "./data/kv".to_string(),
                version_kv_path: "./data/version".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn healthz_returns_200() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.storage.kv_path = dir.path().join("kv").to_string_lossy().to_string();
        config.storage.version_kv_path = dir.path().join("version").to_string_lossy().to_string();
        let state = Arc::new(AppState::build(config, "https://transform.example.com").unwrap());
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn debug_route_404s_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.storage.kv_path = dir.path().join("kv").to_string_lossy().to_string();
        config.storage.version_kv_path = dir.path().join("version").to_string_lossy().to_string();
        let state = Arc::new(AppState::build(config, "https://transform.example.com").unwrap());
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/debug").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
