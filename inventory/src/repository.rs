//! Stock store: product rows behind a read-through, write-through cache.
//!
//! ```text
//!   get_by_id ──▶ cache "product:<id>" ──hit──▶ Product
//!                      │ miss / undecodable
//!                      ▼
//!                 product store ──found──▶ cache.set ──▶ Product
//!                      │ absent
//!                      ▼
//!                    None          (no cache write)
//!
//!   update / update_if_current / delete
//!        spawned task: store write ──▶ cache write
//! ```
//!
//! The persistent store is authoritative. Each write runs its store and cache
//! steps in a spawned task, so a caller that gives up half-way (disconnect,
//! deadline) cannot leave the store written and the cache untouched.

use std::sync::Arc;
use stockroom_core::cache::Cache;
use stockroom_core::store::{ProductStore, StoreError};
use stockroom_core::{InventoryError, NewProduct, Product, ProductId};
use tracing::{debug, warn};

/// Cache-aside access to product rows.
#[derive(Clone)]
pub struct StockStore {
    cache: Arc<dyn Cache>,
    store: Arc<dyn ProductStore>,
}

impl StockStore {
    /// Compose a cache and a persistent store.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, store: Arc<dyn ProductStore>) -> Self {
        Self { cache, store }
    }

    /// Load a product, cache first.
    ///
    /// An absent product is `Ok(None)` and never touches the cache.
    ///
    /// # Errors
    ///
    /// [`InventoryError::DependencyFailure`] when the cache or the store fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, InventoryError> {
        let key = id.cache_key();

        if let Some(raw) = self.cache.get(&key).await? {
            match serde_json::from_str::<Product>(&raw) {
                Ok(product) => {
                    debug!(product_id = %id, "Cache hit");
                    return Ok(Some(product));
                }
                Err(e) => {
                    warn!(product_id = %id, error = %e, "Discarding undecodable cache entry");
                    self.cache.delete(&key).await?;
                }
            }
        }

        let Some(product) = self.store.find(id).await? else {
            debug!(product_id = %id, "Product not found");
            return Ok(None);
        };

        self.cache.set(&key, &encode(&product)?).await?;
        debug!(product_id = %id, version = product.version, "Cache filled from store");
        Ok(Some(product))
    }

    /// Persist a new product. The cache is filled lazily on the next read.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidInput`] for an invalid draft or a taken id
    /// - [`InventoryError::DependencyFailure`] when the store fails
    pub async fn create(&self, product: NewProduct) -> Result<Product, InventoryError> {
        product.validate().map_err(InventoryError::InvalidInput)?;
        let created = self.store.insert(product).await?;
        debug!(product_id = %created.id, stock = created.stock, "Product created");
        Ok(created)
    }

    /// Unconditionally overwrite the row, refresh the cache, and return the
    /// canonical value.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] if the row does not exist
    /// - [`InventoryError::DependencyFailure`] when the cache or the store fails
    pub async fn update(&self, product: Product) -> Result<Product, InventoryError> {
        self.write(product, None).await
    }

    /// Overwrite the row only if its version still equals `product.version`.
    ///
    /// On a version mismatch the cache entry is removed so the next read
    /// goes to the store.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Conflict`] if the row changed since it was read
    /// - [`InventoryError::NotFound`] if the row does not exist
    /// - [`InventoryError::DependencyFailure`] when the cache or the store fails
    pub async fn update_if_current(&self, product: Product) -> Result<Product, InventoryError> {
        let expected = product.version;
        self.write(product, Some(expected)).await
    }

    /// Remove the row and its cache entry.
    ///
    /// Not guarded against in-flight reservations for the same product.
    ///
    /// # Errors
    ///
    /// [`InventoryError::DependencyFailure`] when the cache or the store fails.
    pub async fn delete(&self, id: ProductId) -> Result<(), InventoryError> {
        let cache = Arc::clone(&self.cache);
        let store = Arc::clone(&self.store);

        run_detached(id, async move {
            store.delete(id).await?;
            cache.delete(&id.cache_key()).await?;
            Ok(())
        })
        .await?;

        debug!(product_id = %id, "Product deleted");
        Ok(())
    }

    async fn write(&self, product: Product, expected: Option<i64>) -> Result<Product, InventoryError> {
        let id = product.id;
        let cache = Arc::clone(&self.cache);
        let store = Arc::clone(&self.store);

        run_detached(id, async move {
            let key = id.cache_key();
            match store.update(&product, expected).await {
                Ok(written) => {
                    cache.set(&key, &encode(&written)?).await?;
                    debug!(product_id = %id, version = written.version, stock = written.stock, "Product written");
                    Ok(())
                }
                Err(StoreError::VersionConflict { expected, .. }) => {
                    debug!(product_id = %id, expected, "Stale version, invalidating cache entry");
                    cache.delete(&key).await?;
                    Err(InventoryError::Conflict(id))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await?;

        self.get_by_id(id).await?.ok_or(InventoryError::NotFound(id))
    }
}

/// Run a store+cache pair on its own task and wait for it.
async fn run_detached<F>(id: ProductId, work: F) -> Result<(), InventoryError>
where
    F: std::future::Future<Output = Result<(), InventoryError>> + Send + 'static,
{
    tokio::spawn(work).await.map_err(|e| {
        InventoryError::DependencyFailure(format!("write task for product {id} did not complete: {e}"))
    })?
}

fn encode(product: &Product) -> Result<String, InventoryError> {
    serde_json::to_string(product).map_err(|e| {
        InventoryError::InvariantViolation(format!("product {} cannot be encoded: {e}", product.id))
    })
}
