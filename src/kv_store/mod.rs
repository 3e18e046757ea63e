//! Pluggable KV backend abstraction underlying the KV Engine (C4) and Version
//! Store (C3). Two namespaces are wired at startup: a variant-body namespace and
//! a version namespace, each its own `Arc<dyn KvStore>`.

pub mod memory;
pub mod sled_store;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Metadata stored alongside every KV value. Serialized as JSON inline with the
/// value in backends with no native metadata slot (e.g. `sled`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvMetadata {
    /// Arbitrary key/value pairs (content type, cache version, tags, ...).
    pub fields: std::collections::HashMap<String, String>,
    /// Cache tags attached to this entry, for grouped purge.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KvMetadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Options accepted by a `get` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Advisory edge-cache TTL hint; backends with no native read-side caching
    /// may ignore this.
    pub cache_ttl_seconds: Option<u64>,
}

/// Options accepted by a `put` call.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Metadata to attach.
    pub metadata: KvMetadata,
    /// Time-to-live; `None` means store indefinitely.
    pub ttl_seconds: Option<u64>,
}

/// A stored value plus its metadata, as returned by `get`.
#[derive(Debug, Clone)]
pub struct KvEntry {
    pub value: Bytes,
    pub metadata: KvMetadata,
}

/// Errors a KV backend can report. Per spec.md §7, read failures are treated by
/// callers as a miss; write failures are logged and never fail the client.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv backend io error: {0}")]
    Io(String),
    #[error("kv backend serialization error: {0}")]
    Serialization(String),
}

/// Required KV operations per spec.md §6: `get`, `put`, `delete`, `list_prefix`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str, options: GetOptions) -> Result<Option<KvEntry>, KvError>;
    async fn put(&self, key: &str, value: Bytes, options: PutOptions) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<(), KvError>;
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}
