//! Cache Orchestrator (C11): bypass rules, KV lookup, single-flight coalescing,
//! origin/transform miss handling, and scheduling the background store.
//!
//! The single-flight registry is a `DashMap` of broadcast senders, the way the
//! teacher's rate limiter and IMQuery memoization both use a `DashMap` as the
//! single mutable process-wide structure guarding a piece of shared state (§5).
//! `AppError` is `Clone`, so broadcasting a `Result<Arc<MissResult>, AppError>`
//! to every waiter needs no extra wrapping.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::bg::BackgroundExecutor;
use crate::cache::key::base_key;
use crate::cache::kv::{KvEngine, RetrievedEntry, StoreRequest};
use crate::cache::range::{self, RangeOutcome};
use crate::cache::tags;
use crate::cache::version::VersionStore;
use crate::error::AppError;
use crate::options::TransformOptions;
use crate::origin::failover::fetch_and_transform;
use crate::origin::fetcher::OriginFetcher;
use crate::origin::model::{MatchedOrigin, SourceDescriptor};
use crate::transform::client::{TransformClient, TransformRequest};

/// Where the served bytes came from, for the `X-Cache-Source` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Kv,
    Origin,
}

/// A fully assembled response from the orchestrator.
pub struct OrchestratedResponse {
    pub body: Bytes,
    pub content_type: String,
    pub cache_source: CacheSource,
    /// `(start, end, total_size)` when a satisfiable range was served.
    pub range: Option<(u64, u64, u64)>,
    pub retry: Option<(SourceDescriptor, SourceDescriptor)>,
}

/// Everything the orchestrator needs to serve one request.
pub struct ServeRequest<'a> {
    pub path: &'a str,
    pub options: TransformOptions,
    pub origin: &'a MatchedOrigin,
    pub range_header: Option<&'a str>,
    pub bypass: bool,
    pub transform_base_path: &'a str,
    /// TTL applied to the background store; `None` stores indefinitely, derived
    /// by the caller from `cache.ttl.ok` / `cache.storeIndefinitely`.
    pub store_ttl_seconds: Option<u64>,
}

struct MissResult {
    body: Bytes,
    content_type: String,
    source: SourceDescriptor,
    retry: Option<(SourceDescriptor, SourceDescriptor)>,
    version: u32,
}

/// The Cache Orchestrator: owns the single-flight registry and wires together
/// the KV Engine, Version Store, Origin Fetcher, and Transform Client.
pub struct CacheOrchestrator {
    kv_engine: Arc<KvEngine>,
    version_store: Arc<VersionStore>,
    fetcher: Arc<dyn OriginFetcher>,
    transform_client: Arc<dyn TransformClient>,
    bg: BackgroundExecutor,
    in_flight: DashMap<String, broadcast::Sender<Result<Arc<MissResult>, AppError>>>,
}

impl CacheOrchestrator {
    pub fn new(
        kv_engine: Arc<KvEngine>,
        version_store: Arc<VersionStore>,
        fetcher: Arc<dyn OriginFetcher>,
        transform_client: Arc<dyn TransformClient>,
        bg: BackgroundExecutor,
    ) -> Self {
        Self {
            kv_engine,
            version_store,
            fetcher,
            transform_client,
            bg,
            in_flight: DashMap::new(),
        }
    }

    /// Serve `request`, per the bypass/lookup/coalescing algorithm of spec.md §4.11.
    pub async fn serve(&self, request: ServeRequest<'_>) -> Result<OrchestratedResponse, AppError> {
        let mode = request.options.mode;
        let key = base_key(mode, request.path, &request.options);

        if request.bypass {
            return self.serve_bypass(&key, &request).await;
        }

        if let Some(entry) = self.kv_engine.retrieve(&key).await {
            return self.serve_hit(entry, &request).await;
        }

        let miss = self.serve_miss_coalesced(&key, &request).await?;
        let (body, range) = self.apply_range_to_bytes(&miss.body, request.range_header);
        Ok(OrchestratedResponse {
            body,
            content_type: miss.content_type.clone(),
            cache_source: CacheSource::Origin,
            range,
            retry: miss.retry,
        })
    }

    async fn serve_bypass(
        &self,
        key: &str,
        request: &ServeRequest<'_>,
    ) -> Result<OrchestratedResponse, AppError> {
        let version = self.version_store.get(key).await;
        let miss = self.run_miss(key, request, version).await?;
        let (body, range) = self.apply_range_to_bytes(&miss.body, request.range_header);
        Ok(OrchestratedResponse {
            body,
            content_type: miss.content_type,
            cache_source: CacheSource::Origin,
            range,
            retry: miss.retry,
        })
    }

    async fn serve_hit(
        &self,
        entry: RetrievedEntry,
        request: &ServeRequest<'_>,
    ) -> Result<OrchestratedResponse, AppError> {
        match entry {
            RetrievedEntry::Full { body, metadata } => {
                let (body, range) = self.apply_range_to_bytes(&body, request.range_header);
                Ok(OrchestratedResponse {
                    body,
                    content_type: metadata.content_type,
                    cache_source: CacheSource::Kv,
                    range,
                    retry: None,
                })
            }
            RetrievedEntry::Chunked { manifest, metadata } => {
                let key = base_key(request.options.mode, request.path, &request.options);
                let outcome = request
                    .range_header
                    .map(|h| range::parse_range(h, manifest.total_size))
                    .unwrap_or(RangeOutcome::Full);

                match outcome {
                    RangeOutcome::Range { start, end } => {
                        let segments =
                            range::fetch_range(&self.kv_engine, &key, &manifest, start, end).await?;
                        Ok(OrchestratedResponse {
                            body: concat_segments(segments),
                            content_type: metadata.content_type,
                            cache_source: CacheSource::Kv,
                            range: Some((start, end, manifest.total_size)),
                            retry: None,
                        })
                    }
                    RangeOutcome::Full => {
                        let segments = range::fetch_range(
                            &self.kv_engine,
                            &key,
                            &manifest,
                            0,
                            manifest.total_size - 1,
                        )
                        .await?;
                        Ok(OrchestratedResponse {
                            body: concat_segments(segments),
                            content_type: metadata.content_type,
                            cache_source: CacheSource::Kv,
                            range: None,
                            retry: None,
                        })
                    }
                }
            }
        }
    }

    async fn serve_miss_coalesced(
        &self,
        key: &str,
        request: &ServeRequest<'_>,
    ) -> Result<Arc<MissResult>, AppError> {
        if let Some(sender) = self.in_flight.get(key) {
            let mut receiver = sender.subscribe();
            drop(sender);
            return receiver.recv().await.unwrap_or(Err(AppError::Internal(
                "single-flight sender dropped without a result".to_string(),
            )));
        }

        let (sender, _) = broadcast::channel(1);
        self.in_flight.insert(key.to_string(), sender.clone());

        let version = self.version_store.get(key).await;
        let result = self.run_miss(key, request, version).await.map(Arc::new);

        self.in_flight.remove(key);
        let _ = sender.send(result.clone());
        result
    }

    async fn run_miss(
        &self,
        key: &str,
        request: &ServeRequest<'_>,
        version: u32,
    ) -> Result<MissResult, AppError> {
        let mut options = request.options.clone();
        options.version = version;

        let transform_base_path = request.transform_base_path.to_string();
        let transform_client = self.transform_client.clone();
        let options_for_request = options.clone();

        let outcome = fetch_and_transform(
            self.fetcher.as_ref(),
            transform_client.as_ref(),
            request.origin,
            move |fetch| TransformRequest {
                origin_url: fetch.original_url.clone(),
                options: options_for_request.clone(),
            },
        )
        .await?;

        let cache_tags = tags::generate(request.path, &options);
        let store_request = StoreRequest {
            content_type: outcome.response.content_type.clone(),
            cache_version: version,
            cache_tags,
            source_info: outcome.source,
            derivative: options.derivative.clone(),
            requested_width: options.requested_width,
            requested_height: options.requested_height,
            ttl_seconds: request.store_ttl_seconds,
        };

        let kv_engine = self.kv_engine.clone();
        let version_store = self.version_store.clone();
        let body_for_store = outcome.response.body.clone();
        let key_owned = key.to_string();
        self.bg
            .schedule(async move {
                version_store.increment(&key_owned).await;
                kv_engine.store(&key_owned, body_for_store, store_request).await;
            })
            .await;

        // transform_base_path retained for symmetry with C7's URL-construction
        // contract; the URL itself is built inside fetch_and_transform's closure.
        let _ = transform_base_path;

        Ok(MissResult {
            body: outcome.response.body,
            content_type: outcome.response.content_type,
            source: outcome.source,
            retry: outcome.retry,
            version,
        })
    }

    fn apply_range_to_bytes(
        &self,
        body: &Bytes,
        range_header: Option<&str>,
    ) -> (Bytes, Option<(u64, u64, u64)>) {
        let total = body.len() as u64;
        match range_header.map(|h| range::parse_range(h, total)) {
            Some(RangeOutcome::Range { start, end }) => {
                let sliced = body.slice(start as usize..(end as usize + 1));
                (sliced, Some((start, end, total)))
            }
            _ => (body.clone(), None),
        }
    }
}

/// Concatenate streaming segments back into one contiguous buffer, for callers
/// that don't need segment-level streaming (the api layer streams segments
/// directly instead of calling this).
fn concat_segments(segments: Vec<Bytes>) -> Bytes {
    let mut out = Vec::new();
    for segment in segments {
        out.extend_from_slice(&segment);
    }
    Bytes::from(out)
}
