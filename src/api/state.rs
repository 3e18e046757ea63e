//! Shared application state injected into every handler via axum's `State`
//! extractor, the way the teacher wires a single `Arc<AppState>` through
//! `ApiServerBuilder::with_state` rather than threading individual
//! dependencies through each handler signature.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::bg::BackgroundExecutor;
use crate::cache::kv::KvEngine;
use crate::cache::orchestrator::CacheOrchestrator;
use crate::cache::version::VersionStore;
use crate::config::AppConfig;
use crate::imquery::ImqueryResolver;
use crate::kv_store::KvStore;
use crate::origin::fetcher::{HttpOriginFetcher, OriginFetcher};
use crate::transform::client::{HttpTransformClient, TransformClient};

/// Everything a request handler needs, reloaded config aside, for the lifetime
/// of the process. Config itself lives behind an `ArcSwap` so a reload never
/// requires handlers to re-acquire a lock or block on a writer.
pub struct AppState {
    pub config: ArcSwap<AppConfig>,
    pub orchestrator: Arc<CacheOrchestrator>,
    pub imquery: ImqueryResolver,
    pub transform_base_path: String,
}

impl AppState {
    /// Wire the full dependency graph from a loaded config: KV engine + version
    /// store over the configured `sled` paths, an HTTP origin fetcher, and an
    /// HTTP transform client pointed at `transform_base_path`.
    pub fn build(config: AppConfig, transform_base_path: impl Into<String>) -> anyhow::Result<Self> {
        let variant_store: Arc<dyn KvStore> =
            Arc::new(crate::kv_store::sled_store::SledKvStore::open(&config.storage.kv_path)?);
        let version_kv: Arc<dyn KvStore> =
            Arc::new(crate::kv_store::sled_store::SledKvStore::open(&config.storage.version_kv_path)?);

        let kv_engine = Arc::new(KvEngine::new(
            variant_store,
            Arc::new(crate::cache::lock::ChunkLockManager::new()),
        ));
        let version_store = Arc::new(VersionStore::new(version_kv));
        let fetcher: Arc<dyn OriginFetcher> = Arc::new(HttpOriginFetcher::new());
        let transform_base_path = transform_base_path.into();
        let transform_client: Arc<dyn TransformClient> =
            Arc::new(HttpTransformClient::new(transform_base_path.clone()));

        let orchestrator = Arc::new(CacheOrchestrator::new(
            kv_engine,
            version_store,
            fetcher,
            transform_client,
            BackgroundExecutor::spawning(),
        ));

        Ok(Self {
            config: ArcSwap::new(Arc::new(config)),
            orchestrator,
            imquery: ImqueryResolver::new(),
            transform_base_path,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }
}
