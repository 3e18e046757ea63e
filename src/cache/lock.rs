//! Chunk Lock Manager (C2): a process-wide map from base key to an
//! exclusivity-free exclusive lock.
//!
//! Directly descended from the teacher's `enterprise::cache::lock::DistributedMutex`
//! striped-lock pattern, simplified to single-process exclusive locks — no fencing
//! tokens, no cross-process coordination. Release is deterministic via RAII: the
//! returned guard frees the lock when dropped, even on panic/early return.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Holds the lock for a base key until dropped.
pub struct ChunkLockGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Striped exclusive-lock table, keyed by base key.
#[derive(Default)]
pub struct ChunkLockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChunkLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for `base_key`, blocking until held.
    pub async fn acquire(&self, base_key: &str) -> ChunkLockGuard {
        let mutex = self
            .locks
            .entry(base_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        ChunkLockGuard { _guard: guard }
    }
}
