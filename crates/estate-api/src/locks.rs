//! Per-entity serialization of photo synchronizations.
//!
//! Two concurrent syncs for the same property would both read the same
//! catalog list and the later write would drop the earlier sync's uploads.
//! Requests for one entity therefore run one at a time; different entities
//! never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of async mutexes keyed by entity id. Entries are weak, so a
/// lock lives only as long as somebody holds or waits for it.
#[derive(Clone, Default)]
pub struct EntityLocks {
    inner: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other request holds `entity_id`, then hold it until the
    /// returned guard is dropped.
    pub async fn acquire(&self, entity_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, lock| lock.strong_count() > 0);

            match map.get(entity_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    map.insert(entity_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };

        lock.lock_owned().await
    }

    /// Number of entities currently locked or awaited.
    pub fn active(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|lock| lock.strong_count() > 0).count()
    }
}
