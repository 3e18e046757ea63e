//! Pipeline Entry (C13): request ID, origin match, Option/IMQuery resolution,
//! Cache Orchestrator invocation, response assembly.
//!
//! The single handler here plays the role the teacher splits across many
//! `api::handlers::{list_scans, get_scan, ...}` functions — this system has one
//! resource shape (a transformed video byte range), so one handler carries the
//! whole pipeline rather than being split per-verb/per-resource.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::responses::{build_success_response, success_max_age, Breadcrumb};
use crate::api::state::AppState;
use crate::cache::orchestrator::ServeRequest;
use crate::error::AppError;
use crate::imquery::ImqueryParams;
use crate::options::resolver::{self, RawQuery};
use crate::options::{MappedFrom, TransformMode};
use crate::origin;

/// `GET /*path` — the video-serving entry point.
pub async fn serve_video(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<String>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    match handle(state, request_id.clone(), path, params, headers).await {
        Ok(response) => response,
        Err(err) => err.into_response_with_request_id(request_id),
    }
}

async fn handle(
    state: Arc<AppState>,
    request_id: String,
    path: String,
    params: HashMap<String, String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let config = state.config();
    // axum's `/*path` wildcard captures without a leading slash (`videos/clip.mp4`),
    // but origin matchers are anchored on one (`^/videos/`); restore it before matching.
    let match_path = format!("/{}", path.trim_start_matches('/'));
    let matched_origin = origin::match_origin(&config, &match_path)?;

    let raw_query = RawQuery::from_map(&params);
    let imquery_params = ImqueryParams::from_map(&params);

    let mode = raw_query
        .mode
        .as_deref()
        .and_then(TransformMode::parse)
        .unwrap_or_default();

    let requested_width = imquery_params.width.or(imquery_params.view_width);
    let requested_height = imquery_params.height.or(imquery_params.view_height);

    let mut mapped_from_imquery = false;
    let derivative_name: Option<String> = if let Some(name) = &raw_query.derivative {
        Some(name.clone())
    } else if imquery_params.is_present() {
        let resolved = state.imquery.resolve(&config, &imquery_params);
        if resolved.is_some() {
            mapped_from_imquery = true;
        }
        resolved.map(|r| r.name)
    } else {
        None
    };

    let derivative_pair = derivative_name
        .as_deref()
        .and_then(|name| config.derivatives.get(name).map(|cfg| (name, cfg)));

    let mut options = resolver::resolve(
        mode,
        &config.video_defaults,
        derivative_pair,
        matched_origin.config.transformation_overrides.as_ref(),
        &raw_query,
    );
    if mapped_from_imquery {
        options.mapped_from = Some(MappedFrom::Imquery);
    }
    options.requested_width = requested_width;
    options.requested_height = requested_height;
    options.imquery = imquery_params.is_present();

    let bypass = is_bypass(&config, &params, &headers);

    let ttl = matched_origin.config.ttl_overrides.unwrap_or(config.cache.ttl);
    let max_age = success_max_age(config.cache.store_indefinitely, ttl.ok);
    let store_ttl_seconds = max_age;

    let range_header = headers
        .get(axum::http::header::RANGE)
        .and_then(|v| v.to_str().ok());

    let transform_base_path = state.transform_base_path.clone();
    let orchestrated = state
        .orchestrator
        .serve(ServeRequest {
            path: &path,
            options,
            origin: &matched_origin,
            range_header,
            bypass,
            transform_base_path: &transform_base_path,
            store_ttl_seconds,
        })
        .await?;

    let breadcrumbs = if config.debug.enabled && params.contains_key("debug") {
        vec![
            Breadcrumb::new("origin", matched_origin.config.name.clone()),
            Breadcrumb::new("mode", mode.as_str()),
        ]
    } else {
        Vec::new()
    };

    Ok(build_success_response(orchestrated, &request_id, max_age, &breadcrumbs))
}

/// Bypass rules per spec.md §4.11: any recognized control query parameter, a
/// non-cacheable method, or a `Cache-Control: no-store`/`no-cache` request header.
fn is_bypass(config: &crate::config::AppConfig, params: &HashMap<String, String>, headers: &HeaderMap) -> bool {
    let control_param_present = params.contains_key("nocache")
        || params.contains_key("bypass")
        || params.contains_key("debug")
        || config
            .cache
            .bypass_query_parameters
            .iter()
            .any(|p| params.contains_key(p));

    let cache_control_forbids = headers
        .get(axum::http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("no-store") || v.contains("no-cache"))
        .unwrap_or(false);

    control_param_present || cache_control_forbids
}

/// `GET /healthz` — unauthenticated liveness probe.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, TtlConfig};
    use std::collections::HashMap;

    fn cache_config() -> CacheConfig {
        CacheConfig {
            ttl: TtlConfig { ok: 1, client_error: 1, server_error: 1, redirects: 1 },
            enable_versioning: true,
            enable_cache_tags: true,
            store_indefinitely: false,
            bypass_query_parameters: vec!["preview".to_string()],
        }
    }

    fn config_with(cache: CacheConfig) -> crate::config::AppConfig {
        crate::config::AppConfig {
            version: 1,
            debug: Default::default(),
            logging: Default::default(),
            cache,
            video_defaults: Default::default(),
            derivatives: HashMap::new(),
            responsive_breakpoints: HashMap::new(),
            origins: vec![],
            storage: crate::config::StorageConfig {
                priority: vec![],
                kv_path: "./data/kv".to_string(),
                version_kv_path: "./data/version".to_string(),
            },
        }
    }

    #[test]
    fn nocache_param_triggers_bypass() {
        let config = config_with(cache_config());
        let mut params = HashMap::new();
        params.insert("nocache".to_string(), "1".to_string());
        assert!(is_bypass(&config, &params, &HeaderMap::new()));
    }

    #[test]
    fn custom_bypass_parameter_triggers_bypass() {
        let config = config_with(cache_config());
        let mut params = HashMap::new();
        params.insert("preview".to_string(), "1".to_string());
        assert!(is_bypass(&config, &params, &HeaderMap::new()));
    }

    #[test]
    fn no_store_cache_control_header_triggers_bypass() {
        let config = config_with(cache_config());
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::CACHE_CONTROL, "no-store".parse().unwrap());
        assert!(is_bypass(&config, &HashMap::new(), &headers));
    }

    #[test]
    fn plain_request_is_not_bypassed() {
        let config = config_with(cache_config());
        assert!(!is_bypass(&config, &HashMap::new(), &HeaderMap::new()));
    }

    #[test]
    fn wildcard_captured_path_is_reslashed_before_origin_match() {
        // axum's `/*path` wildcard yields the captured segment without its
        // leading slash; origin matchers are anchored on one.
        let captured = "videos/clip.mp4";
        let match_path = format!("/{}", captured.trim_start_matches('/'));
        assert_eq!(match_path, "/videos/clip.mp4");
    }
}
