use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::RecordKind;

type Key = (RecordKind, String);

/// Per-record async locks.
///
/// Mutations of one record are serialized; different records proceed in
/// parallel. Lock entries are pruned once nobody holds or waits on them.
#[derive(Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

/// Held locks; dropping releases them.
pub struct RecordGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: Key) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Only the map holds an unused lock.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key).or_default().clone()
    }

    pub async fn acquire(&self, kind: RecordKind, id: &str) -> RecordGuard {
        self.acquire_many(vec![(kind, id.to_string())]).await
    }

    /// Locks several records at once, always in key order so two callers
    /// locking overlapping sets cannot deadlock.
    pub async fn acquire_many(&self, mut keys: Vec<Key>) -> RecordGuard {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = self.entry(key);
            guards.push(lock.lock_owned().await);
        }
        RecordGuard { _guards: guards }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
