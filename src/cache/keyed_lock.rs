use dashmap::DashMap;
use std::{future::Future, hash::Hash, pin::Pin, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Acquire = Pin<Box<dyn Future<Output = OwnedMutexGuard<()>> + Send>>;

/// One async mutex per natural key (spotify id, normalized query, party id).
///
/// Serializes check-then-insert sequences for the same key inside this
/// process. Slots are created on demand and dropped once nobody holds or
/// waits on them.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    slots: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> KeyedLocks<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Waits for the lock on `key`.
    ///
    /// Dropping the returned future before it resolves gives up the wait and
    /// releases the slot like a dropped guard would.
    pub async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        // clone under the shard lock so a concurrent release cannot drop the slot
        let slot = self.slots.entry(key.clone()).or_default().clone();

        let mut guard = KeyedGuard {
            locks: self,
            key: key.clone(),
            acquire: Some(Box::pin(slot.lock_owned())),
            held: None,
        };
        if let Some(acquire) = guard.acquire.as_mut() {
            guard.held = Some(acquire.await);
        }
        guard.acquire = None;
        guard
    }

    /// Number of keys currently locked or waited on.
    pub fn active(&self) -> usize {
        self.slots.len()
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

pub struct KeyedGuard<'a, K>
where
    K: Clone + Eq + Hash,
{
    locks: &'a KeyedLocks<K>,
    key: K,
    acquire: Option<Acquire>,
    held: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyedGuard<'_, K>
where
    K: Clone + Eq + Hash,
{
    fn drop(&mut self) {
        // both own a clone of the slot
        self.acquire.take();
        self.held.take();
        self.locks
            .slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
