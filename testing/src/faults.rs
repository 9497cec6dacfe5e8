//! Failure injection wrappers.
//!
//! Each wrapper delegates to an inner implementation until told to fail.
//! Failures are armed with a count so that "fails twice, then recovers"
//! scenarios can drive retry paths.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use stockroom_core::cache::{Cache, CacheError};
use stockroom_core::product::{NewProduct, Product, ProductId};
use stockroom_core::store::{ProductStore, StoreError};

/// A countdown of injected failures. `usize::MAX` means "fail forever".
#[derive(Debug, Default)]
struct Trip(AtomicUsize);

impl Trip {
    fn arm(&self, times: usize) {
        self.0.store(times, Ordering::SeqCst);
    }

    fn fire(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// [`Cache`] wrapper whose reads and writes can be made to fail.
#[derive(Clone)]
pub struct FlakyCache<C> {
    inner: C,
    gets: Arc<Trip>,
    sets: Arc<Trip>,
}

impl<C: Cache> FlakyCache<C> {
    /// Wrap `inner`; no failures armed.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            gets: Arc::default(),
            sets: Arc::default(),
        }
    }

    /// Fail the next `times` gets (`usize::MAX` for all).
    pub fn fail_gets(&self, times: usize) {
        self.gets.arm(times);
    }

    /// Fail the next `times` sets (`usize::MAX` for all).
    pub fn fail_sets(&self, times: usize) {
        self.sets.arm(times);
    }

    /// The wrapped cache.
    #[must_use]
    pub const fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Cache> Cache for FlakyCache<C> {
    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        if self.sets.fire() {
            let err = CacheError::Command {
                command: "SET",
                key: key.to_string(),
                reason: "injected failure".to_string(),
            };
            return Box::pin(async move { Err(err) });
        }
        self.inner.set(key, value)
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        if self.gets.fire() {
            return Box::pin(async { Err(CacheError::Connection("injected failure".to_string())) });
        }
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        self.inner.delete(key)
    }

    fn ttl(&self) -> Duration {
        self.inner.ttl()
    }
}

/// [`ProductStore`] wrapper whose reads and updates can be made to fail or stall.
#[derive(Clone)]
pub struct FlakyProductStore<S> {
    inner: S,
    finds: Arc<Trip>,
    updates: Arc<Trip>,
    conflicts: Arc<Trip>,
    find_latency_ms: Arc<AtomicU64>,
}

impl<S: ProductStore> FlakyProductStore<S> {
    /// Wrap `inner`; no failures armed.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            finds: Arc::default(),
            updates: Arc::default(),
            conflicts: Arc::default(),
            find_latency_ms: Arc::default(),
        }
    }

    /// Fail the next `times` finds with a database error.
    pub fn fail_finds(&self, times: usize) {
        self.finds.arm(times);
    }

    /// Fail the next `times` updates with a database error.
    pub fn fail_updates(&self, times: usize) {
        self.updates.arm(times);
    }

    /// Report a version conflict on the next `times` conditional updates.
    pub fn conflict_updates(&self, times: usize) {
        self.conflicts.arm(times);
    }

    /// Delay every find by `latency` (zero to stop).
    pub fn slow_finds(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.find_latency_ms.store(millis, Ordering::SeqCst);
    }

    /// The wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ProductStore> ProductStore for FlakyProductStore<S> {
    fn find(
        &self,
        id: ProductId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Product>, StoreError>> + Send + '_>> {
        if self.finds.fire() {
            return Box::pin(async { Err(StoreError::Database("injected failure".to_string())) });
        }
        let latency = self.find_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            let find = self.inner.find(id);
            return Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(latency)).await;
                find.await
            });
        }
        self.inner.find(id)
    }

    fn insert(
        &self,
        product: NewProduct,
    ) -> Pin<Box<dyn Future<Output = Result<Product, StoreError>> + Send + '_>> {
        self.inner.insert(product)
    }

    fn update(
        &self,
        product: &Product,
        expected_version: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Product, StoreError>> + Send + '_>> {
        if let Some(expected) = expected_version {
            if self.conflicts.fire() {
                let id = product.id;
                return Box::pin(async move { Err(StoreError::VersionConflict { id, expected }) });
            }
        }
        if self.updates.fire() {
            return Box::pin(async { Err(StoreError::Database("injected failure".to_string())) });
        }
        self.inner.update(product, expected_version)
    }

    fn delete(&self, id: ProductId) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        self.inner.delete(id)
    }
}
