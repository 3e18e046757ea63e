//! Version Store (C3): a thin wrapper over the version-namespace `KvStore`.
//!
//! Values are stored as decimal ASCII text. Per spec.md §4.3, a read-then-write
//! with a short retry window is acceptable even on a last-write-wins backend:
//! duplicate bumps are benign because cache keys are stable and version only
//! affects the upstream cache-busting query parameter.

use std::sync::Arc;

use crate::kv_store::{GetOptions, KvStore, PutOptions};

const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Version Store: `get`/`increment` over the version namespace.
pub struct VersionStore {
    kv: Arc<dyn KvStore>,
}

impl VersionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Return the stored version for `cache_key`, defaulting to 1 if absent or
    /// on a read failure (treated the same as "no version recorded yet").
    pub async fn get(&self, cache_key: &str) -> u32 {
        match self.kv.get(cache_key, GetOptions::default()).await {
            Ok(Some(entry)) => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(1),
            _ => 1,
        }
    }

    /// Atomically bump the counter for `cache_key`, retrying a bounded number of
    /// times on write failure. Returns the version this call believes it wrote;
    /// concurrent bumps may race harmlessly to the same or a higher value.
    pub async fn increment(&self, cache_key: &str) -> u32 {
        let mut last_error = None;
        for _ in 0..MAX_RETRY_ATTEMPTS {
            let current = self.get(cache_key).await;
            let next = current + 1;
            match self
                .kv
                .put(
                    cache_key,
                    bytes::Bytes::from(next.to_string()),
                    PutOptions::default(),
                )
                .await
            {
                Ok(()) => return next,
                Err(err) => {
                    last_error = Some(err);
                }
            }
        }
        tracing::warn!(cache_key, error = ?last_error, "version increment failed after retries");
        self.get(cache_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::memory::MemoryKvStore;

    #[tokio::test]
    async fn get_defaults_to_one_when_absent() {
        let store = VersionStore::new(Arc::new(MemoryKvStore::new()));
        assert_eq!(store.get("key").await, 1);
    }

    #[tokio::test]
    async fn increment_bumps_from_default() {
        let store = VersionStore::new(Arc::new(MemoryKvStore::new()));
        assert_eq!(store.increment("key").await, 2);
        assert_eq!(store.get("key").await, 2);
    }

    #[tokio::test]
    async fn repeated_increments_accumulate() {
        let store = VersionStore::new(Arc::new(MemoryKvStore::new()));
        store.increment("key").await;
        store.increment("key").await;
        let version = store.increment("key").await;
        assert_eq!(version, 4);
    }
}
