//! Cache abstraction with a fixed time-to-live.
//!
//! The cache accelerates product reads in front of the persistent store. It is
//! never authoritative: every entry expires after the same fixed window, and
//! callers cannot choose a per-entry TTL.
//!
//! # Contract
//!
//! - `set` always applies the implementation's fixed TTL
//! - `get` on a missing or expired key returns `Ok(None)`, never an error
//! - `delete` on a missing key succeeds
//! - Transport or protocol failures surface as [`CacheError`]
//!
//! # Implementations
//!
//! - `RedisCache` (in `stockroom-redis`) - production
//! - `InMemoryCache` (in `stockroom-testing`) - tests, with an injectable clock

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by cache implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Could not reach the cache server
    #[error("Cache connection failed: {0}")]
    Connection(String),

    /// The cache rejected or failed a command
    #[error("Cache command '{command}' failed for key '{key}': {reason}")]
    Command {
        /// Command name (GET, SET, DEL)
        command: &'static str,
        /// Key the command targeted
        key: String,
        /// Reason reported by the cache
        reason: String,
    },
}

/// Key/value cache with a fixed expiry window.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the trait stays
/// dyn-compatible (`Arc<dyn Cache>`).
pub trait Cache: Send + Sync {
    /// Store `value` under `key` with the fixed TTL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be reached or rejects the write.
    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// Fetch the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or has expired.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] only for transport or protocol failures.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>>;

    /// Remove `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be reached.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// The fixed expiry window applied by [`Cache::set`].
    fn ttl(&self) -> Duration;
}
