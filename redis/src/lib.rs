//! Redis cache for Stockroom.
//!
//! [`RedisCache`] implements the fixed-TTL [`Cache`] contract from
//! `stockroom-core` over a Redis connection manager:
//!
//! | Operation | Redis command          |
//! |-----------|------------------------|
//! | `set`     | `SET key value EX ttl` |
//! | `get`     | `GET key`              |
//! | `delete`  | `DEL key`              |
//!
//! The TTL is fixed when the cache is built; callers cannot pick a per-entry
//! expiry.
//!
//! # Example
//!
//! ```no_run
//! use stockroom_redis::RedisCache;
//! use stockroom_core::Cache;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisCache::connect("redis://127.0.0.1:6379", Duration::from_secs(120)).await?;
//!
//! cache.set("product:1", r#"{"id":1}"#).await?;
//! let cached = cache.get("product:1").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use stockroom_core::cache::{Cache, CacheError};

/// [`Cache`] over Redis with a fixed expiry.
#[derive(Clone)]
pub struct RedisCache {
    /// Connection manager for connection pooling and reconnects.
    conn_manager: ConnectionManager,
    ttl: Duration,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    /// * `ttl` - Expiry applied to every entry (rounded up to whole seconds, at least 1)
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Connection(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!(ttl_secs = ttl_seconds(ttl), "Connected to Redis cache");

        Ok(Self { conn_manager, ttl })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn from_manager(conn_manager: ConnectionManager, ttl: Duration) -> Self {
        Self { conn_manager, ttl }
    }

    /// Round-trip a `PING`, for readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the server does not answer.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// `EX` takes whole seconds; never round a sub-second TTL down to "no expiry".
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

fn command_error(command: &'static str, key: &str, err: &redis::RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        CacheError::Connection(err.to_string())
    } else {
        CacheError::Command {
            command,
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

impl Cache for RedisCache {
    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let () = conn
                .set_ex(&key, value, ttl_seconds(self.ttl))
                .await
                .map_err(|e| command_error("SET", &key, &e))?;
            tracing::trace!(key = %key, "Cache set");
            Ok(())
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| command_error("GET", &key, &e))?;
            tracing::trace!(key = %key, hit = value.is_some(), "Cache get");
            Ok(value)
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _removed: i64 = conn
                .del(&key)
                .await
                .map_err(|e| command_error("DEL", &key, &e))?;
            Ok(())
        })
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_seconds(Duration::from_secs(120)), 120);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }
}
