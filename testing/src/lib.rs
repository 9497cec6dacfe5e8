//! # Stockroom Testing
//!
//! In-memory doubles for the seams of the inventory core, so the stock store,
//! reservation engine, event consumer and HTTP surface can be tested without
//! Redis, Postgres or Redpanda.
//!
//! This crate provides:
//! - [`FixedClock`] / [`ManualClock`]: deterministic time
//! - [`InMemoryCache`]: fixed-TTL cache that expires against an injected clock
//! - [`InMemoryProductStore`]: versioned product rows with optimistic writes
//! - [`InMemoryLedger`]: reservation holds
//! - [`InMemoryEventBus`]: channel-backed order-event stream
//! - [`FlakyCache`] / [`FlakyProductStore`]: failure injection
//!
//! ## Example
//!
//! ```
//! use stockroom_testing::{InMemoryCache, InMemoryProductStore, test_clock};
//! use stockroom_core::{ProductId, ProductStore};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryProductStore::seeded();
//! let cache = InMemoryCache::with_clock(Duration::from_secs(120), test_clock());
//!
//! let product = store.find(ProductId::new(1)).await?;
//! assert_eq!(product.map(|p| p.stock), Some(50));
//! # let _ = cache;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod event_bus;
pub mod faults;
pub mod ledger;
pub mod store;

pub use cache::InMemoryCache;
pub use clock::{FixedClock, ManualClock, test_clock};
pub use event_bus::InMemoryEventBus;
pub use faults::{FlakyCache, FlakyProductStore};
pub use ledger::InMemoryLedger;
pub use store::InMemoryProductStore;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Doubles keep working after a panicking test thread poisoned a lock.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
