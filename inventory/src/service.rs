//! Reservation engine: the only writer of stock.
//!
//! Every mutation for a product runs read-check-write under that product's
//! lock, and writes with an optimistic version check so that other processes
//! sharing the store cannot interleave with it:
//!
//! ```text
//!   lock(product) ─▶ read ─▶ decide ─▶ deadline? ─▶ update_if_current
//!        ▲                                               │ Conflict
//!        └──────────── backoff, re-read ◀────────────────┘
//! ```
//!
//! The caller's deadline bounds the lock wait and the read. It is checked once
//! more before the write; a write that has been issued always completes.

use crate::metrics;
use crate::repository::StockStore;
use std::future::Future;
use std::time::Duration;
use stockroom_core::{Deadline, InventoryError, Product, ProductId};
use stockroom_runtime::{KeyedLocks, RetryPolicy, retry_if};
use tracing::{debug, error, info};

/// Stock rules on top of the [`StockStore`].
pub struct ReservationEngine {
    stock: StockStore,
    locks: KeyedLocks<ProductId>,
    conflict_retry: RetryPolicy,
}

impl ReservationEngine {
    /// Create an engine with the default conflict policy (5 retries).
    #[must_use]
    pub fn new(stock: StockStore) -> Self {
        Self {
            stock,
            locks: KeyedLocks::new(),
            conflict_retry: RetryPolicy::builder()
                .max_retries(5)
                .initial_delay(Duration::from_millis(5))
                .max_delay(Duration::from_millis(200))
                .build(),
        }
    }

    /// Replace the policy used when a stock write hits a version conflict.
    #[must_use]
    pub fn with_conflict_retry(mut self, policy: RetryPolicy) -> Self {
        self.conflict_retry = policy;
        self
    }

    /// Current stock of a product.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidInput`] for a non-positive id
    /// - [`InventoryError::NotFound`] for an unknown product
    /// - [`InventoryError::InvariantViolation`] if the stored stock is negative
    /// - [`InventoryError::DependencyFailure`] when the cache or the store fails
    pub async fn get_stock(&self, id: ProductId) -> Result<i64, InventoryError> {
        validate_id(id)?;
        let product = self.stock.get_by_id(id).await?.ok_or(InventoryError::NotFound(id))?;
        check_stock(&product)?;
        Ok(product.stock)
    }

    /// Take `quantity` units out of stock.
    ///
    /// Returns `Ok(false)` without writing anything when `quantity` exceeds
    /// the available stock.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidInput`] for a non-positive id or quantity
    /// - [`InventoryError::NotFound`] for an unknown product
    /// - [`InventoryError::DeadlineExceeded`] if the deadline passed before the write
    /// - [`InventoryError::Conflict`] if concurrent writers won every retry
    /// - [`InventoryError::DependencyFailure`] / [`InventoryError::InvariantViolation`]
    pub async fn reserve(
        &self,
        id: ProductId,
        quantity: i64,
        deadline: Deadline,
    ) -> Result<bool, InventoryError> {
        match self.try_reserve(id, quantity, deadline).await {
            Ok(()) => Ok(true),
            Err(InventoryError::InsufficientStock { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Like [`reserve`](Self::reserve), but a declined reservation is an
    /// [`InventoryError::InsufficientStock`] carrying the stock on hand.
    ///
    /// # Errors
    ///
    /// [`InventoryError::InsufficientStock`] when `quantity` exceeds the
    /// available stock, plus every error of [`reserve`](Self::reserve).
    pub async fn try_reserve(
        &self,
        id: ProductId,
        quantity: i64,
        deadline: Deadline,
    ) -> Result<(), InventoryError> {
        let result = self.reserve_inner(id, quantity, deadline).await;

        match &result {
            Ok(()) => {
                metrics::record_reservation("reserved");
                info!(product_id = %id, quantity, "Stock reserved");
            }
            Err(e) => {
                if let InventoryError::InsufficientStock { available, .. } = e {
                    info!(product_id = %id, quantity, available, "Reservation declined: insufficient stock");
                }
                metrics::record_reservation(metrics::error_outcome(e));
            }
        }
        result
    }

    /// Return `quantity` units to stock.
    ///
    /// Not bounded by earlier reservations: any positive quantity is accepted
    /// for an existing product.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidInput`] for a non-positive id or quantity, or on overflow
    /// - [`InventoryError::NotFound`] for an unknown product
    /// - [`InventoryError::DeadlineExceeded`] if the deadline passed before the write
    /// - [`InventoryError::Conflict`] if concurrent writers won every retry
    /// - [`InventoryError::DependencyFailure`] / [`InventoryError::InvariantViolation`]
    pub async fn release(
        &self,
        id: ProductId,
        quantity: i64,
        deadline: Deadline,
    ) -> Result<bool, InventoryError> {
        let result = self.release_inner(id, quantity, deadline).await;

        match &result {
            Ok(_) => {
                metrics::record_release("released");
                info!(product_id = %id, quantity, "Stock released");
            }
            Err(e) => metrics::record_release(metrics::error_outcome(e)),
        }
        result
    }

    async fn reserve_inner(
        &self,
        id: ProductId,
        quantity: i64,
        deadline: Deadline,
    ) -> Result<(), InventoryError> {
        validate_id(id)?;
        validate_quantity(quantity)?;

        let mutation = self
            .mutate(id, deadline, |product| {
                if quantity > product.stock {
                    Ok(None)
                } else {
                    Ok(Some(product.stock - quantity))
                }
            })
            .await?;

        match mutation {
            Mutation::Written => Ok(()),
            Mutation::Unchanged { stock } => Err(InventoryError::InsufficientStock {
                product_id: id,
                requested: quantity,
                available: stock,
            }),
        }
    }

    async fn release_inner(
        &self,
        id: ProductId,
        quantity: i64,
        deadline: Deadline,
    ) -> Result<bool, InventoryError> {
        validate_id(id)?;
        validate_quantity(quantity)?;

        let mutation = self
            .mutate(id, deadline, |product| {
                product.stock.checked_add(quantity).map(Some).ok_or_else(|| {
                    InventoryError::InvalidInput(format!(
                        "Releasing {quantity} units would overflow the stock of product {id}"
                    ))
                })
            })
            .await?;
        Ok(mutation == Mutation::Written)
    }

    /// Serialized read-decide-write.
    ///
    /// `decide` returns the new stock, or `None` to leave the row untouched.
    async fn mutate<F>(&self, id: ProductId, deadline: Deadline, decide: F) -> Result<Mutation, InventoryError>
    where
        F: Fn(&Product) -> Result<Option<i64>, InventoryError>,
    {
        let _guard = within(deadline, self.locks.lock(id)).await?;

        let stock = &self.stock;
        let decide = &decide;

        retry_if(
            &self.conflict_retry,
            move || async move {
                let product = within(deadline, stock.get_by_id(id))
                    .await??
                    .ok_or(InventoryError::NotFound(id))?;
                check_stock(&product)?;

                let Some(next) = decide(&product)? else {
                    return Ok(Mutation::Unchanged { stock: product.stock });
                };

                deadline.check()?;
                match stock.update_if_current(product.with_stock(next)).await {
                    Ok(written) => {
                        debug!(product_id = %id, from = product.stock, to = written.stock, version = written.version, "Stock updated");
                        Ok(Mutation::Written)
                    }
                    Err(InventoryError::Conflict(id)) => {
                        metrics::record_conflict();
                        debug!(product_id = %id, version = product.version, "Stock write lost a version race");
                        Err(InventoryError::Conflict(id))
                    }
                    Err(e) => Err(e),
                }
            },
            |err| matches!(err, InventoryError::Conflict(_)),
        )
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Written,
    Unchanged { stock: i64 },
}

/// Await `fut`, giving up with [`InventoryError::DeadlineExceeded`] at the deadline.
async fn within<T>(deadline: Deadline, fut: impl Future<Output = T>) -> Result<T, InventoryError> {
    match deadline.instant() {
        None => Ok(fut.await),
        Some(at) => tokio::time::timeout_at(at.into(), fut)
            .await
            .map_err(|_| InventoryError::DeadlineExceeded),
    }
}

fn check_stock(product: &Product) -> Result<(), InventoryError> {
    if product.stock < 0 {
        error!(
            product_id = %product.id,
            stock = product.stock,
            version = product.version,
            "Persisted stock is negative"
        );
        return Err(InventoryError::InvariantViolation(format!(
            "product {} has negative stock {}",
            product.id, product.stock
        )));
    }
    Ok(())
}

fn validate_id(id: ProductId) -> Result<(), InventoryError> {
    if id.get() <= 0 {
        return Err(InventoryError::InvalidInput(format!(
            "Product id must be positive, got {id}"
        )));
    }
    Ok(())
}

fn validate_quantity(quantity: i64) -> Result<(), InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidInput(format!(
            "Quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use stockroom_testing::{FlakyProductStore, InMemoryCache, InMemoryProductStore};

    fn engine_over(store: Arc<InMemoryProductStore>) -> (ReservationEngine, Arc<InMemoryCache>) {
        let cache = Arc::new(InMemoryCache::new(Duration::from_secs(120)));
        let engine = ReservationEngine::new(StockStore::new(cache.clone(), store));
        (engine, cache)
    }

    fn seeded() -> (ReservationEngine, Arc<InMemoryProductStore>) {
        let store = Arc::new(InMemoryProductStore::seeded());
        let (engine, _) = engine_over(store.clone());
        (engine, store)
    }

    #[tokio::test]
    async fn reserve_then_decline_keeps_stock() {
        let (engine, store) = seeded();
        let id = ProductId::new(1);

        assert!(engine.reserve(id, 10, Deadline::none()).await.unwrap());
        assert_eq!(engine.get_stock(id).await.unwrap(), 40);

        let updates = store.update_count();
        assert!(!engine.reserve(id, 45, Deadline::none()).await.unwrap());
        assert_eq!(engine.get_stock(id).await.unwrap(), 40);
        assert_eq!(store.update_count(), updates);
    }

    #[tokio::test]
    async fn try_reserve_reports_what_is_on_hand() {
        let (engine, store) = seeded();
        let id = ProductId::new(1);

        assert_eq!(engine.try_reserve(id, 10, Deadline::none()).await, Ok(()));
        assert_eq!(
            engine.try_reserve(id, 45, Deadline::none()).await,
            Err(InventoryError::InsufficientStock {
                product_id: id,
                requested: 45,
                available: 40,
            })
        );
        assert_eq!(store.stock_of(id), Some(40));
    }

    #[tokio::test]
    async fn reserving_everything_leaves_zero() {
        let (engine, _) = seeded();
        assert!(engine.reserve(ProductId::new(2), 30, Deadline::none()).await.unwrap());
        assert_eq!(engine.get_stock(ProductId::new(2)).await.unwrap(), 0);
        assert!(!engine.reserve(ProductId::new(2), 1, Deadline::none()).await.unwrap());
    }

    #[tokio::test]
    async fn release_adds_stock() {
        let (engine, _) = seeded();
        assert!(engine.release(ProductId::new(1), 5, Deadline::none()).await.unwrap());
        assert_eq!(engine.get_stock(ProductId::new(1)).await.unwrap(), 55);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (engine, _) = seeded();
        let id = ProductId::new(999);
        assert_eq!(engine.get_stock(id).await, Err(InventoryError::NotFound(id)));
        assert_eq!(engine.reserve(id, 1, Deadline::none()).await, Err(InventoryError::NotFound(id)));
        assert_eq!(engine.release(id, 1, Deadline::none()).await, Err(InventoryError::NotFound(id)));
    }

    #[tokio::test]
    async fn non_positive_inputs_are_rejected_before_io() {
        let (engine, store) = seeded();
        for quantity in [0, -3] {
            assert!(matches!(
                engine.reserve(ProductId::new(1), quantity, Deadline::none()).await,
                Err(InventoryError::InvalidInput(_))
            ));
            assert!(matches!(
                engine.release(ProductId::new(1), quantity, Deadline::none()).await,
                Err(InventoryError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            engine.get_stock(ProductId::new(0)).await,
            Err(InventoryError::InvalidInput(_))
        ));
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn release_overflow_is_invalid_input() {
        let (engine, store) = seeded();
        let mut full = store.snapshot(ProductId::new(1)).unwrap();
        full.stock = i64::MAX - 1;
        store.put(full);

        assert!(matches!(
            engine.release(ProductId::new(1), 5, Deadline::none()).await,
            Err(InventoryError::InvalidInput(_))
        ));
        assert_eq!(store.stock_of(ProductId::new(1)), Some(i64::MAX - 1));
    }

    #[tokio::test]
    async fn negative_persisted_stock_is_an_invariant_violation() {
        let (engine, store) = seeded();
        let mut broken = store.snapshot(ProductId::new(2)).unwrap();
        broken.stock = -4;
        store.put(broken);

        assert!(matches!(
            engine.get_stock(ProductId::new(2)).await,
            Err(InventoryError::InvariantViolation(_))
        ));
        assert!(matches!(
            engine.reserve(ProductId::new(2), 1, Deadline::none()).await,
            Err(InventoryError::InvariantViolation(_))
        ));
        // Other products keep serving.
        assert_eq!(engine.get_stock(ProductId::new(1)).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn expired_deadline_writes_nothing() {
        let (engine, store) = seeded();

        let result = engine
            .reserve(ProductId::new(1), 1, Deadline::at(Instant::now()))
            .await;

        assert_eq!(result, Err(InventoryError::DeadlineExceeded));
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn deadline_bounds_the_lock_wait() {
        let (engine, store) = seeded();
        let _held = engine.locks.lock(ProductId::new(1)).await;

        let result = engine
            .reserve(ProductId::new(1), 1, Deadline::after(Duration::from_millis(20)))
            .await;

        assert_eq!(result, Err(InventoryError::DeadlineExceeded));
        assert_eq!(store.stock_of(ProductId::new(1)), Some(50));
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_the_write_lands() {
        let store = Arc::new(FlakyProductStore::new(InMemoryProductStore::seeded()));
        let cache = Arc::new(InMemoryCache::new(Duration::from_secs(120)));
        let engine = ReservationEngine::new(StockStore::new(cache, store.clone()));
        store.conflict_updates(2);

        assert!(engine.reserve(ProductId::new(1), 5, Deadline::none()).await.unwrap());
        assert_eq!(store.inner().stock_of(ProductId::new(1)), Some(45));
    }

    #[tokio::test]
    async fn exhausted_conflicts_surface_as_conflict() {
        let store = Arc::new(FlakyProductStore::new(InMemoryProductStore::seeded()));
        let cache = Arc::new(InMemoryCache::new(Duration::from_secs(120)));
        let engine = ReservationEngine::new(StockStore::new(cache, store.clone()))
            .with_conflict_retry(RetryPolicy::builder().max_retries(1).initial_delay(Duration::from_millis(1)).build());
        store.conflict_updates(usize::MAX);

        assert_eq!(
            engine.reserve(ProductId::new(1), 5, Deadline::none()).await,
            Err(InventoryError::Conflict(ProductId::new(1)))
        );
        assert_eq!(store.inner().stock_of(ProductId::new(1)), Some(50));
    }

    #[tokio::test]
    async fn stale_cache_is_invalidated_and_the_reserve_succeeds() {
        let store = Arc::new(InMemoryProductStore::seeded());
        let (engine, cache) = engine_over(store.clone());
        engine.get_stock(ProductId::new(1)).await.unwrap();

        // Another instance sold 20 units; our cache still says 50 at version 1.
        let mut newer = store.snapshot(ProductId::new(1)).unwrap().with_stock(30);
        newer.version = 2;
        store.put(newer);

        assert!(engine.reserve(ProductId::new(1), 10, Deadline::none()).await.unwrap());
        assert_eq!(store.stock_of(ProductId::new(1)), Some(20));
        let cached: Product = serde_json::from_str(&cache.peek("product:1").unwrap()).unwrap();
        assert_eq!(cached.stock, 20);
    }

    #[tokio::test]
    async fn concurrent_reserves_never_oversell() {
        let store = Arc::new(InMemoryProductStore::new());
        store.put(Product {
            id: ProductId::new(5),
            name: "Scarce".to_string(),
            description: String::new(),
            price: 1.0,
            stock: 7,
            version: 1,
        });
        let (engine, _) = engine_over(store.clone());
        let engine = Arc::new(engine);

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.reserve(ProductId::new(5), 1, Deadline::none()).await })
            })
            .collect();

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 7);
        assert_eq!(store.stock_of(ProductId::new(5)), Some(0));
        assert!(engine.locks.is_empty());
    }
}
