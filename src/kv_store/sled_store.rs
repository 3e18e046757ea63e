//! `sled`-backed `KvStore` implementation.
//!
//! `sled` is already in the teacher's dependency table (there, used for CAD file
//! caching); repurposed here as the durable backend for both the variant-body and
//! version namespaces. `sled` has no native per-entry TTL, so `cacheTtl`/`ttl`
//! hints are honored advisory-only via a stored expiry timestamp, checked (and
//! lazily swept) on read.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::kv_store::{GetOptions, KvEntry, KvError, KvMetadata, KvStore, PutOptions};

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    value: Vec<u8>,
    metadata: KvMetadata,
    expires_at_epoch_ms: Option<u64>,
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `sled`-backed `KvStore`.
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    /// Open (or create) a `sled` database at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, KvError> {
        let db = sled::open(path).map_err(|err| KvError::Io(err.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl KvStore for SledKvStore {
    async fn get(&self, key: &str, _options: GetOptions) -> Result<Option<KvEntry>, KvError> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let Some(raw) = db.get(key.as_bytes()).map_err(|err| KvError::Io(err.to_string()))?
            else {
                return Ok(None);
            };
            let record: StoredRecord =
                serde_json::from_slice(&raw).map_err(|err| KvError::Serialization(err.to_string()))?;

            if let Some(expires_at) = record.expires_at_epoch_ms {
                if now_epoch_ms() >= expires_at {
                    let _ = db.remove(key.as_bytes());
                    return Ok(None);
                }
            }

            Ok(Some(KvEntry {
                value: Bytes::from(record.value),
                metadata: record.metadata,
            }))
        })
        .await
        .map_err(|err| KvError::Io(err.to_string()))?
    }

    async fn put(&self, key: &str, value: Bytes, options: PutOptions) -> Result<(), KvError> {
        let db = self.db.clone();
        let key = key.to_string();
        let expires_at_epoch_ms = options
            .ttl_seconds
            .map(|secs| now_epoch_ms() + secs.saturating_mul(1000));
        let record = StoredRecord {
            value: value.to_vec(),
            metadata: options.metadata,
            expires_at_epoch_ms,
        };
        tokio::task::spawn_blocking(move || {
            let serialized =
                serde_json::to_vec(&record).map_err(|err| KvError::Serialization(err.to_string()))?;
            db.insert(key.as_bytes(), serialized)
                .map_err(|err| KvError::Io(err.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|err| KvError::Io(err.to_string()))?
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            db.remove(key.as_bytes())
                .map_err(|err| KvError::Io(err.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|err| KvError::Io(err.to_string()))?
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let db = self.db.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            for item in db.scan_prefix(prefix.as_bytes()) {
                let (key, _) = item.map_err(|err| KvError::Io(err.to_string()))?;
                keys.push(String::from_utf8_lossy(&key).to_string());
            }
            Ok(keys)
        })
        .await
        .map_err(|err| KvError::Io(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path()).unwrap();
        store
            .put("k", Bytes::from_static(b"hello"), PutOptions::default())
            .await
            .unwrap();
        let entry = store.get("k", GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(entry.value, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn ttl_expiry_makes_key_disappear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path()).unwrap();
        store
            .put(
                "k",
                Bytes::from_static(b"hello"),
                PutOptions {
                    metadata: KvMetadata::default(),
                    ttl_seconds: Some(0),
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(store.get("k", GetOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_prefix_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path()).unwrap();
        store.put("a_chunk_0", Bytes::new(), PutOptions::default()).await.unwrap();
        store.put("a_chunk_1", Bytes::new(), PutOptions::default()).await.unwrap();
        store.put("b", Bytes::new(), PutOptions::default()).await.unwrap();
        let mut listed = store.list_prefix("a_chunk").await.unwrap();
        listed.sort();
        assert_eq!(listed, vec!["a_chunk_0", "a_chunk_1"]);
    }
}
