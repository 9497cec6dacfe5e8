//! In-memory fixed-TTL cache.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use stockroom_core::cache::{Cache, CacheError};
use stockroom_core::environment::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// `HashMap`-backed [`Cache`] that expires entries against an injected clock.
///
/// # Example
///
/// ```
/// use stockroom_testing::{InMemoryCache, ManualClock};
/// use stockroom_core::Cache;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let clock = ManualClock::default();
/// let cache = InMemoryCache::with_clock(Duration::from_secs(120), clock.clone());
///
/// cache.set("product:1", "{}").await?;
/// clock.advance(Duration::from_secs(121));
/// assert_eq!(cache.get("product:1").await?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryCache {
    /// Cache with the given TTL, expiring against wall-clock time.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }

    /// Cache with the given TTL, expiring against `clock`.
    #[must_use]
    pub fn with_clock(ttl: Duration, clock: impl Clock + 'static) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock: Arc::new(clock),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether a live (unexpired) entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Read a live entry without going through the async trait.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        crate::read(&self.entries)
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Store `value` directly, bypassing the write counter.
    ///
    /// Useful for planting stale or corrupt entries.
    pub fn plant(&self, key: &str, value: &str) {
        let expires_at = self.expiry_from(self.clock.now());
        crate::write(&self.entries).insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    /// Number of `set` calls served so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        crate::read(&self.entries).len()
    }

    /// Whether no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl Cache for InMemoryCache {
    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.plant(key, value);
        Box::pin(async { Ok(()) })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        let now = self.clock.now();
        let value = {
            let mut entries = crate::write(&self.entries);
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
                Some(_) => {
                    entries.remove(key);
                    None
                }
                None => None,
            }
        };
        Box::pin(async move { Ok(value) })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        crate::write(&self.entries).remove(key);
        Box::pin(async { Ok(()) })
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
