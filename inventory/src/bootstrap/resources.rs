//! Resource management for infrastructure setup.
//!
//! Centralizes infrastructure initialization (`PostgreSQL`, Redis, `RedPanda`)
//! into a single [`ResourceManager`]:
//!
//! 1. Connect to `PostgreSQL` and apply migrations
//! 2. Connect to the Redis cache
//! 3. Create the event bus client
//!
//! Everything is held behind the core traits, so tests can assemble a
//! `ResourceManager` from in-memory doubles with [`ResourceManager::new`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = Config::from_env();
//! let resources = ResourceManager::from_config(&config).await?;
//! let engine = Arc::new(resources.reservation_engine());
//! ```

use crate::config::Config;
use crate::repository::StockStore;
use crate::service::ReservationEngine;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use stockroom_core::{
    Cache, CacheError, EventBus, EventBusError, ProductStore, ReservationLedger, StoreError,
};
use stockroom_postgres::{PostgresProductStore, PostgresReservationLedger};
use stockroom_redis::RedisCache;
use stockroom_redpanda::RedpandaEventBus;
use thiserror::Error;
use tracing::info;

/// Failure while bringing the service up.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Could not open the `PostgreSQL` pool.
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations failed.
    #[error("Database migration failed: {0}")]
    Migration(#[from] StoreError),

    /// Could not reach Redis.
    #[error("Cache connection failed: {0}")]
    Cache(#[from] CacheError),

    /// Could not create the event bus client.
    #[error("Event bus setup failed: {0}")]
    EventBus(#[from] EventBusError),

    /// Could not bind a listener.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested
        address: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Central resource manager for all infrastructure components.
///
/// All resources are `Arc`-wrapped trait objects, shared between the HTTP
/// server and the event consumer.
#[derive(Clone)]
pub struct ResourceManager {
    /// Application configuration
    pub config: Arc<Config>,

    /// Product snapshot cache
    pub cache: Arc<dyn Cache>,

    /// Authoritative product rows
    pub products: Arc<dyn ProductStore>,

    /// Per-order reservation holds
    pub ledger: Arc<dyn ReservationLedger>,

    /// Order event transport
    pub event_bus: Arc<dyn EventBus>,
}

impl ResourceManager {
    /// Assemble resources from already-built components.
    #[must_use]
    pub fn new(
        config: Config,
        cache: Arc<dyn Cache>,
        products: Arc<dyn ProductStore>,
        ledger: Arc<dyn ReservationLedger>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            products,
            ledger,
            event_bus,
        }
    }

    /// Initialize all infrastructure resources from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] if the database is unreachable, a migration
    /// fails, Redis is unreachable, or the event bus client cannot be created.
    pub async fn from_config(config: &Config) -> Result<Self, BootstrapError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres.max_connections)
            .min_connections(config.postgres.min_connections)
            .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
            .connect(&config.postgres.url)
            .await?;

        info!("Running database migrations...");
        stockroom_postgres::run_migrations(&pool).await?;
        info!("PostgreSQL ready");

        info!("Connecting to Redis...");
        let cache = RedisCache::connect(&config.redis.url, config.cache_ttl()).await?;
        cache.ping().await?;
        info!("Redis cache connected");

        info!("Creating RedPanda event bus...");
        let event_bus = RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .buffer_size(config.consumer.lane_buffer)
            .build()?;
        info!("Event bus ready");

        Ok(Self::new(
            config.clone(),
            Arc::new(cache),
            Arc::new(PostgresProductStore::new(pool.clone())),
            Arc::new(PostgresReservationLedger::new(pool)),
            Arc::new(event_bus),
        ))
    }

    /// Build the reservation engine over these resources.
    ///
    /// The HTTP server and the event consumer must share the one engine
    /// returned here, so that both entry points go through the same
    /// per-product locks.
    #[must_use]
    pub fn reservation_engine(&self) -> ReservationEngine {
        ReservationEngine::new(StockStore::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.products),
        ))
    }
}
