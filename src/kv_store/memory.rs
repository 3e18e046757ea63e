//! In-memory `KvStore`, backed by `DashMap`, honoring per-key TTL via a stored
//! expiry instant. Used for tests and single-process deployments.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::kv_store::{GetOptions, KvEntry, KvError, KvMetadata, KvStore, PutOptions};

struct StoredValue {
    value: Bytes,
    metadata: KvMetadata,
    expires_at: Option<Instant>,
}

/// `DashMap`-backed `KvStore` implementation.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str, _options: GetOptions) -> Result<Option<KvEntry>, KvError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if let Some(expires_at) = entry.expires_at {
            if Instant::now() >= expires_at {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
        }
        Ok(Some(KvEntry {
            value: entry.value.clone(),
            metadata: entry.metadata.clone(),
        }))
    }

    async fn put(&self, key: &str, value: Bytes, options: PutOptions) -> Result<(), KvError> {
        let expires_at = options
            .ttl_seconds
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                metadata: options.metadata,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}
