//! In-memory versioned product store.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use stockroom_core::product::{NewProduct, Product, ProductId};
use stockroom_core::store::{ProductStore, StoreError};

/// [`ProductStore`] over a `BTreeMap`, with the same versioning rules as the
/// Postgres store: inserts start at version 1, every update bumps the version,
/// conditional updates compare against the stored version.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductStore {
    rows: Arc<RwLock<BTreeMap<ProductId, Product>>>,
    updates: Arc<AtomicUsize>,
}

impl InMemoryProductStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding the two demo products:
    /// `1 "Product A"` (price 100, stock 50) and `2 "Product B"` (price 200, stock 30).
    #[must_use]
    pub fn seeded() -> Self {
        let store = Self::new();
        store.put(Product {
            id: ProductId::new(1),
            name: "Product A".to_string(),
            description: "Description of Product A".to_string(),
            price: 100.0,
            stock: 50,
            version: 1,
        });
        store.put(Product {
            id: ProductId::new(2),
            name: "Product B".to_string(),
            description: "Description of Product B".to_string(),
            price: 200.0,
            stock: 30,
            version: 1,
        });
        store
    }

    /// Overwrite a row verbatim, version included.
    ///
    /// Simulates a write from another process.
    pub fn put(&self, product: Product) {
        crate::write(&self.rows).insert(product.id, product);
    }

    /// Current row, read synchronously.
    #[must_use]
    pub fn snapshot(&self, id: ProductId) -> Option<Product> {
        crate::read(&self.rows).get(&id).cloned()
    }

    /// Current stock, read synchronously.
    #[must_use]
    pub fn stock_of(&self, id: ProductId) -> Option<i64> {
        self.snapshot(id).map(|product| product.stock)
    }

    /// Number of successful `update` calls.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl ProductStore for InMemoryProductStore {
    fn find(
        &self,
        id: ProductId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Product>, StoreError>> + Send + '_>> {
        let row = self.snapshot(id);
        Box::pin(async move { Ok(row) })
    }

    fn insert(
        &self,
        product: NewProduct,
    ) -> Pin<Box<dyn Future<Output = Result<Product, StoreError>> + Send + '_>> {
        let result = {
            let mut rows = crate::write(&self.rows);
            let id = product.id.unwrap_or_else(|| {
                let next = rows.keys().next_back().map_or(1, |last| last.get() + 1);
                ProductId::new(next)
            });

            if rows.contains_key(&id) {
                Err(StoreError::Duplicate(id))
            } else if product.stock < 0 {
                Err(StoreError::Constraint(format!("stock must be >= 0, got {}", product.stock)))
            } else {
                let row = Product {
                    id,
                    name: product.name,
                    description: product.description,
                    price: product.price,
                    stock: product.stock,
                    version: 1,
                };
                rows.insert(id, row.clone());
                Ok(row)
            }
        };
        Box::pin(async move { result })
    }

    fn update(
        &self,
        product: &Product,
        expected_version: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Product, StoreError>> + Send + '_>> {
        let result = {
            let mut rows = crate::write(&self.rows);
            match rows.get_mut(&product.id) {
                None => Err(StoreError::Missing(product.id)),
                Some(current) if expected_version.is_some_and(|v| v != current.version) => {
                    Err(StoreError::VersionConflict {
                        id: product.id,
                        expected: expected_version.unwrap_or_default(),
                    })
                }
                Some(_) if product.stock < 0 => Err(StoreError::Constraint(format!(
                    "stock must be >= 0, got {}",
                    product.stock
                ))),
                Some(current) => {
                    let next_version = current.version + 1;
                    *current = Product {
                        version: next_version,
                        ..product.clone()
                    };
                    self.updates.fetch_add(1, Ordering::SeqCst);
                    Ok(current.clone())
                }
            }
        };
        Box::pin(async move { result })
    }

    fn delete(&self, id: ProductId) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        crate::write(&self.rows).remove(&id);
        Box::pin(async { Ok(()) })
    }
}
