//! KV Engine (C4): the single-vs-chunked layout decision, manifest round-trip,
//! and the retry/cleanup policy of spec.md §4.4 and §7.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::cache::key::chunk_key;
use crate::cache::lock::ChunkLockManager;
use crate::error::AppError;
use crate::kv_store::{GetOptions, KvMetadata, KvStore, PutOptions};
use crate::origin::model::SourceDescriptor;

/// A KV value over this size is never stored; it's served to the caller directly.
pub const SINGLE_ENTRY_LIMIT: u64 = 20 * 1024 * 1024;
/// Target size of each chunk in a chunked entry.
pub const STANDARD_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
/// Bodies above this size skip KV storage entirely.
pub const FALLBACK_STORE_SKIP_LIMIT: u64 = 128 * 1024 * 1024;
/// Advisory edge-cache TTL hint attached to every read.
pub const KV_READ_EDGE_TTL_SECS: u64 = 3600;
/// Per-chunk fetch timeout, independent of the overall request deadline.
pub const CHUNK_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_WRITE_RETRIES: u32 = 3;

/// Manifest stored as the base key's value when an entry is chunked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub total_size: u64,
    pub chunk_count: u32,
    pub standard_chunk_size: u64,
    pub actual_chunk_sizes: Vec<u64>,
    pub original_content_type: String,
}

impl Manifest {
    /// Invariant check: `sum(actual_chunk_sizes) == total_size` and
    /// `actual_chunk_sizes.len() == chunk_count`.
    pub fn is_consistent(&self) -> bool {
        self.actual_chunk_sizes.len() as u32 == self.chunk_count
            && self.actual_chunk_sizes.iter().sum::<u64>() == self.total_size
    }
}

/// Metadata associated with every KV entry (base and chunk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantMetadata {
    pub content_type: String,
    pub content_length: u64,
    pub cache_version: u32,
    pub cache_tags: Vec<String>,
    pub created_at: String,
    pub is_chunked: bool,
    pub chunk_index: Option<u32>,
    pub source_info: SourceDescriptor,
    pub derivative: Option<String>,
    pub requested_width: Option<u32>,
    pub requested_height: Option<u32>,
}

/// Caller-supplied fields needed to build a `VariantMetadata` and perform a store.
pub struct StoreRequest {
    pub content_type: String,
    pub cache_version: u32,
    pub cache_tags: Vec<String>,
    pub source_info: SourceDescriptor,
    pub derivative: Option<String>,
    pub requested_width: Option<u32>,
    pub requested_height: Option<u32>,
    pub ttl_seconds: Option<u64>,
}

fn metadata_to_kv(metadata: &VariantMetadata) -> KvMetadata {
    let mut kv = KvMetadata::default()
        .with_field("contentType", &metadata.content_type)
        .with_field("contentLength", metadata.content_length.to_string())
        .with_field("cacheVersion", metadata.cache_version.to_string())
        .with_field("createdAt", &metadata.created_at)
        .with_field("isChunked", metadata.is_chunked.to_string());
    if let Some(idx) = metadata.chunk_index {
        kv = kv.with_field("chunkIndex", idx.to_string());
    }
    kv = kv
        .with_field("sourceKind", metadata.source_info.kind.as_str())
        .with_field("sourcePriority", metadata.source_info.priority.to_string());
    if let Some(derivative) = &metadata.derivative {
        kv = kv.with_field("derivative", derivative);
    }
    if let Some(w) = metadata.requested_width {
        kv = kv.with_field("requestedWidth", w.to_string());
    }
    if let Some(h) = metadata.requested_height {
        kv = kv.with_field("requestedHeight", h.to_string());
    }
    kv.tags = metadata.cache_tags.clone();
    kv
}

fn metadata_from_kv(kv: &KvMetadata, content_length: u64) -> VariantMetadata {
    VariantMetadata {
        content_type: kv
            .get("contentType")
            .unwrap_or("application/octet-stream")
            .to_string(),
        content_length,
        cache_version: kv.get("cacheVersion").and_then(|v| v.parse().ok()).unwrap_or(1),
        cache_tags: kv.tags.clone(),
        created_at: kv.get("createdAt").unwrap_or_default().to_string(),
        is_chunked: kv.get("isChunked") == Some("true"),
        chunk_index: kv.get("chunkIndex").and_then(|v| v.parse().ok()),
        source_info: SourceDescriptor {
            kind: match kv.get("sourceKind") {
                Some("r2") => crate::origin::model::SourceKind::R2,
                Some("fallback") => crate::origin::model::SourceKind::Fallback,
                _ => crate::origin::model::SourceKind::Remote,
            },
            priority: kv.get("sourcePriority").and_then(|v| v.parse().ok()).unwrap_or(0),
        },
        derivative: kv.get("derivative").map(|s| s.to_string()),
        requested_width: kv.get("requestedWidth").and_then(|v| v.parse().ok()),
        requested_height: kv.get("requestedHeight").and_then(|v| v.parse().ok()),
    }
}

/// A successfully retrieved variant, in either layout.
pub enum RetrievedEntry {
    /// A single-entry variant: the full body is already in hand.
    Full { body: Bytes, metadata: VariantMetadata },
    /// A chunked variant: callers fetch chunks as needed (full body or range).
    Chunked { manifest: Manifest, metadata: VariantMetadata },
}

/// Compute the chunk size layout for `total_size`: `ceil(total_size / STANDARD_CHUNK_SIZE)`
/// chunks, every chunk `STANDARD_CHUNK_SIZE` except a shorter final remainder chunk.
pub fn compute_chunk_layout(total_size: u64) -> Vec<u64> {
    let mut sizes = Vec::new();
    let mut remaining = total_size;
    while remaining > 0 {
        let this_chunk = remaining.min(STANDARD_CHUNK_SIZE);
        sizes.push(this_chunk);
        remaining -= this_chunk;
    }
    sizes
}

/// The KV Engine: chunking/single-entry decisions, retries, and chunk cleanup.
pub struct KvEngine {
    store: Arc<dyn KvStore>,
    chunk_lock: Arc<ChunkLockManager>,
}

impl KvEngine {
    pub fn new(store: Arc<dyn KvStore>, chunk_lock: Arc<ChunkLockManager>) -> Self {
        Self { store, chunk_lock }
    }

    /// Retrieve the base entry for `base_key`. KV read failures are treated as a
    /// miss, per spec.md §7's propagation policy.
    pub async fn retrieve(&self, base_key: &str) -> Option<RetrievedEntry> {
        let options = GetOptions {
            cache_ttl_seconds: Some(KV_READ_EDGE_TTL_SECS),
        };
        let entry = match self.store.get(base_key, options).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(base_key, error = %err, "kv read failed, treating as miss");
                return None;
            }
        };

        if entry.metadata.get("isChunked") == Some("true") {
            let manifest: Manifest = match serde_json::from_slice(&entry.value) {
                Ok(manifest) => manifest,
                Err(err) => {
                    tracing::warn!(base_key, error = %err, "corrupt manifest, treating as miss");
                    return None;
                }
            };
            let metadata = metadata_from_kv(&entry.metadata, manifest.total_size);
            Some(RetrievedEntry::Chunked { manifest, metadata })
        } else {
            let content_length = entry.value.len() as u64;
            let metadata = metadata_from_kv(&entry.metadata, content_length);
            Some(RetrievedEntry::Full {
                body: entry.value,
                metadata,
            })
        }
    }

    /// Fetch a single chunk by index, bounded by `CHUNK_FETCH_TIMEOUT`.
    pub async fn get_chunk(&self, base_key: &str, index: u32) -> Result<Bytes, AppError> {
        let key = chunk_key(base_key, index);
        let store = self.store.clone();
        let fetch = async move { store.get(&key, GetOptions::default()).await };
        match timeout(CHUNK_FETCH_TIMEOUT, fetch).await {
            Ok(Ok(Some(entry))) => Ok(entry.value),
            Ok(Ok(None)) => Err(AppError::Internal(format!(
                "chunk {} missing for base key '{}'",
                index, base_key
            ))),
            Ok(Err(err)) => Err(AppError::Internal(format!("chunk fetch failed: {}", err))),
            Err(_) => Err(AppError::Internal(format!(
                "chunk {} fetch timed out for base key '{}'",
                index, base_key
            ))),
        }
    }

    /// Store `body` under `base_key`, choosing single-entry or chunked layout.
    /// Never fails the caller's request — write failures are logged and
    /// swallowed, matching spec.md §4.4 step 7 ("stores run in the background").
    pub async fn store(&self, base_key: &str, body: Bytes, request: StoreRequest) {
        let total_size = body.len() as u64;
        if total_size > FALLBACK_STORE_SKIP_LIMIT {
            tracing::info!(base_key, total_size, "body exceeds skip limit, not caching");
            return;
        }

        let created_at = chrono::Utc::now().to_rfc3339();

        if total_size <= SINGLE_ENTRY_LIMIT {
            let metadata = VariantMetadata {
                content_type: request.content_type.clone(),
                content_length: total_size,
                cache_version: request.cache_version,
                cache_tags: request.cache_tags.clone(),
                created_at,
                is_chunked: false,
                chunk_index: None,
                source_info: request.source_info,
                derivative: request.derivative.clone(),
                requested_width: request.requested_width,
                requested_height: request.requested_height,
            };
            self.put_with_retry(base_key, body, &metadata, request.ttl_seconds).await;
            return;
        }

        self.store_chunked(base_key, body, request, created_at).await;
    }

    async fn store_chunked(
        &self,
        base_key: &str,
        body: Bytes,
        request: StoreRequest,
        created_at: String,
    ) {
        let total_size = body.len() as u64;
        let sizes = compute_chunk_layout(total_size);
        let chunk_count = sizes.len() as u32;

        let _lock = self.chunk_lock.acquire(base_key).await;

        let mut offset = 0usize;
        let mut written_chunks = Vec::new();
        for (index, &size) in sizes.iter().enumerate() {
            let slice = body.slice(offset..offset + size as usize);
            offset += size as usize;
            let key = chunk_key(base_key, index as u32);
            let metadata = VariantMetadata {
                content_type: request.content_type.clone(),
                content_length: size,
                cache_version: request.cache_version,
                cache_tags: request.cache_tags.clone(),
                created_at: created_at.clone(),
                is_chunked: false,
                chunk_index: Some(index as u32),
                source_info: request.source_info,
                derivative: request.derivative.clone(),
                requested_width: request.requested_width,
                requested_height: request.requested_height,
            };
            if !self
                .put_with_retry(&key, slice, &metadata, request.ttl_seconds)
                .await
            {
                self.cleanup_chunks(base_key, &written_chunks).await;
                return;
            }
            written_chunks.push(index as u32);
        }

        let manifest = Manifest {
            total_size,
            chunk_count,
            standard_chunk_size: STANDARD_CHUNK_SIZE,
            actual_chunk_sizes: sizes,
            original_content_type: request.content_type.clone(),
        };
        if !manifest.is_consistent() {
            tracing::error!(base_key, "chunk layout invariant violated, aborting store");
            self.cleanup_chunks(base_key, &written_chunks).await;
            return;
        }

        let manifest_metadata = VariantMetadata {
            content_type: request.content_type.clone(),
            content_length: total_size,
            cache_version: request.cache_version,
            cache_tags: request.cache_tags.clone(),
            created_at,
            is_chunked: true,
            chunk_index: None,
            source_info: request.source_info,
            derivative: request.derivative,
            requested_width: request.requested_width,
            requested_height: request.requested_height,
        };
        let manifest_bytes = match serde_json::to_vec(&manifest) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                tracing::error!(base_key, error = %err, "manifest serialization failed");
                self.cleanup_chunks(base_key, &written_chunks).await;
                return;
            }
        };

        if !self
            .put_with_retry(base_key, manifest_bytes, &manifest_metadata, request.ttl_seconds)
            .await
        {
            self.cleanup_chunks(base_key, &written_chunks).await;
        }
    }

    async fn cleanup_chunks(&self, base_key: &str, written_chunks: &[u32]) {
        for &index in written_chunks {
            let key = chunk_key(base_key, index);
            if let Err(err) = self.store.delete(&key).await {
                tracing::warn!(base_key, chunk = index, error = %err, "failed to clean up orphan chunk");
            }
        }
    }

    async fn put_with_retry(
        &self,
        key: &str,
        value: Bytes,
        metadata: &VariantMetadata,
        ttl_seconds: Option<u64>,
    ) -> bool {
        let kv_metadata = metadata_to_kv(metadata);
        let mut delay = Duration::from_millis(50);
        for attempt in 1..=MAX_WRITE_RETRIES {
            let options = PutOptions {
                metadata: kv_metadata.clone(),
                ttl_seconds,
            };
            match self.store.put(key, value.clone(), options).await {
                Ok(()) => return true,
                Err(err) => {
                    tracing::warn!(key, attempt, error = %err, "kv write failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        tracing::error!(key, "kv write failed after all retries");
        false
    }

    /// List variant metadata under a path prefix, for diagnostic/admin use. Not
    /// on the hot path.
    pub async fn list(&self, base_path_prefix: &str) -> Vec<VariantMetadata> {
        let keys = self.store.list_prefix(base_path_prefix).await.unwrap_or_default();
        let mut result = Vec::new();
        for key in keys {
            if let Ok(Some(entry)) = self.store.get(&key, GetOptions::default()).await {
                result.push(metadata_from_kv(&entry.metadata, entry.value.len() as u64));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::memory::MemoryKvStore;
    use crate::origin::model::SourceKind;

    fn engine() -> KvEngine {
        KvEngine::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(ChunkLockManager::new()),
        )
    }

    fn store_request() -> StoreRequest {
        StoreRequest {
            content_type: "video/mp4".to_string(),
            cache_version: 1,
            cache_tags: vec!["vp-p-videos-sample-mp4".to_string()],
            source_info: SourceDescriptor {
                kind: SourceKind::R2,
                priority: 0,
            },
            derivative: Some("mobile".to_string()),
            requested_width: None,
            requested_height: None,
            ttl_seconds: Some(86400),
        }
    }

    #[test]
    fn chunk_layout_exactly_20mib_is_not_chunked_boundary() {
        assert_eq!(SINGLE_ENTRY_LIMIT, 20 * 1024 * 1024);
    }

    #[test]
    fn chunk_layout_20mib_plus_one_is_five_chunks() {
        let sizes = compute_chunk_layout(SINGLE_ENTRY_LIMIT + 1);
        assert_eq!(sizes.len(), 5);
        assert_eq!(sizes[0], STANDARD_CHUNK_SIZE);
        assert_eq!(sizes[4], 1);
    }

    #[test]
    fn chunk_layout_32mib_is_seven_chunks_matching_seed_scenario() {
        let sizes = compute_chunk_layout(32 * 1024 * 1024);
        assert_eq!(sizes.len(), 7);
        assert_eq!(&sizes[0..6], &[STANDARD_CHUNK_SIZE; 6]);
        assert_eq!(sizes[6], 2 * 1024 * 1024);
        assert_eq!(sizes.iter().sum::<u64>(), 32 * 1024 * 1024);
    }

    #[tokio::test]
    async fn small_body_stores_as_single_entry_and_round_trips() {
        let engine = engine();
        let body = Bytes::from(vec![7u8; 2 * 1024 * 1024]);
        engine.store("base", body.clone(), store_request()).await;

        match engine.retrieve("base").await.unwrap() {
            RetrievedEntry::Full { body: retrieved, metadata } => {
                assert_eq!(retrieved, body);
                assert!(!metadata.is_chunked);
                assert_eq!(metadata.derivative.as_deref(), Some("mobile"));
            }
            RetrievedEntry::Chunked { .. } => panic!("expected single-entry layout"),
        }
    }

    #[tokio::test]
    async fn large_body_stores_chunked_with_consistent_manifest() {
        let engine = engine();
        let total = (SINGLE_ENTRY_LIMIT + 1) as usize;
        let body = Bytes::from(vec![3u8; total]);
        engine.store("base", body.clone(), store_request()).await;

        match engine.retrieve("base").await.unwrap() {
            RetrievedEntry::Chunked { manifest, .. } => {
                assert!(manifest.is_consistent());
                assert_eq!(manifest.total_size, total as u64);
                let mut reassembled = Vec::new();
                for i in 0..manifest.chunk_count {
                    reassembled.extend_from_slice(&engine.get_chunk("base", i).await.unwrap());
                }
                assert_eq!(Bytes::from(reassembled), body);
            }
            RetrievedEntry::Full { .. } => panic!("expected chunked layout"),
        }
    }

    #[tokio::test]
    async fn missing_key_retrieves_none() {
        let engine = engine();
        assert!(engine.retrieve("absent").await.is_none());
    }

    #[tokio::test]
    async fn oversized_body_skips_storage_entirely() {
        let engine = engine();
        let body = Bytes::from(vec![1u8; (FALLBACK_STORE_SKIP_LIMIT + 1) as usize]);
        engine.store("base", body, store_request()).await;
        assert!(engine.retrieve("base").await.is_none());
    }
}
