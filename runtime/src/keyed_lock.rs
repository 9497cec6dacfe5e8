//! Per-key async mutual exclusion.
//!
//! [`KeyedLocks`] lazily creates one `tokio::sync::Mutex` per key and hands out
//! owned guards. Entries are removed from the table as soon as the last holder
//! or waiter for a key goes away, so the table only ever contains keys with
//! in-flight work.
//!
//! # Example
//!
//! ```
//! use stockroom_runtime::KeyedLocks;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let locks = KeyedLocks::new();
//!
//! let guard = locks.lock(42_i64).await;
//! // ... read-modify-write for key 42 ...
//! drop(guard);
//!
//! assert!(locks.is_empty());
//! # }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Table of per-key async mutexes.
pub struct KeyedLocks<K> {
    table: Table<K>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to `key`.
    ///
    /// Cancel-safe: dropping the returned future before it resolves gives up
    /// the place in line without affecting other waiters.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let slot = self.slot(key);
        let guard = Arc::clone(&slot.mutex).lock_owned().await;
        KeyedGuard { guard, _slot: slot }
    }

    /// Number of keys currently held or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    /// Whether no key is currently held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: K) -> Slot<K> {
        let mutex = {
            let mut table = lock_table(&self.table);
            Arc::clone(table.entry(key.clone()).or_default())
        };
        Slot {
            key,
            mutex,
            table: Arc::clone(&self.table),
        }
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to one key. Released on drop.
pub struct KeyedGuard<K>
where
    K: Eq + Hash,
{
    // Field order matters: the mutex guard must drop before the slot so the
    // slot sees an accurate reference count.
    guard: OwnedMutexGuard<()>,
    _slot: Slot<K>,
}

impl<K> KeyedGuard<K>
where
    K: Eq + Hash,
{
    /// The key this guard protects.
    #[must_use]
    pub fn key(&self) -> &K {
        &self._slot.key
    }
}

impl<K: Eq + Hash> std::fmt::Debug for KeyedGuard<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedGuard").field("held", &*self.guard).finish()
    }
}

/// A registered interest in a key: either waiting for or holding its mutex.
struct Slot<K>
where
    K: Eq + Hash,
{
    key: K,
    mutex: Arc<AsyncMutex<()>>,
    table: Table<K>,
}

impl<K> Drop for Slot<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        // One reference lives in the table, one in this slot.
        if Arc::strong_count(&self.mutex) == 2 {
            table.remove(&self.key);
        }
    }
}

fn lock_table<K>(table: &Mutex<HashMap<K, Arc<AsyncMutex<()>>>>) -> MutexGuard<'_, HashMap<K, Arc<AsyncMutex<()>>>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entry_is_removed_after_release() {
        let locks = KeyedLocks::new();
        let guard = locks.lock(1_i64).await;
        assert_eq!(locks.len(), 1);
        assert_eq!(*guard.key(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("product-1".to_string()).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap_or_default();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _first = locks.lock(1_i64).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(2_i64)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_entry() {
        let locks = KeyedLocks::new();
        let holder = locks.lock(7_i64).await;
        let waited = tokio::time::timeout(Duration::from_millis(10), locks.lock(7_i64)).await;
        assert!(waited.is_err());
        drop(holder);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_wakes_when_holder_releases() {
        let locks = KeyedLocks::new();
        let holder = locks.lock(3_i64).await;

        let mut waiter = tokio_test::task::spawn(locks.lock(3_i64));
        tokio_test::assert_pending!(waiter.poll());
        assert_eq!(locks.len(), 1);

        drop(holder);
        assert!(waiter.is_woken());
        let guard = tokio_test::assert_ready!(waiter.poll());
        assert_eq!(*guard.key(), 3);
        drop(guard);
        drop(waiter);
        assert!(locks.is_empty());
    }
}
