//! Persistent product store abstraction.
//!
//! The [`ProductStore`] is the source of truth for product rows. Every write
//! bumps the row's `version`; conditional writes compare against the version
//! the caller read, which gives multi-process deployments optimistic
//! concurrency on stock mutations.
//!
//! # Implementations
//!
//! - `PostgresProductStore` (in `stockroom-postgres`) - production
//! - `InMemoryProductStore` (in `stockroom-testing`) - tests only

use crate::product::{NewProduct, Product, ProductId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by persistent store implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the row changed since it was read.
    #[error("Version conflict on product {id}: expected version {expected}")]
    VersionConflict {
        /// Product whose row changed
        id: ProductId,
        /// Version the caller expected to overwrite
        expected: i64,
    },

    /// The row to update does not exist.
    #[error("Product {0} does not exist")]
    Missing(ProductId),

    /// A product with the requested id already exists.
    #[error("Product {0} already exists")]
    Duplicate(ProductId),

    /// The row violates a storage constraint (e.g. negative stock).
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Authoritative storage for product rows.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the trait stays
/// dyn-compatible (`Arc<dyn ProductStore>`).
pub trait ProductStore: Send + Sync {
    /// Load a product row. Absent rows are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn find(
        &self,
        id: ProductId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Product>, StoreError>> + Send + '_>>;

    /// Insert a new row, assigning an id when the draft has none.
    ///
    /// The returned product has `version == 1`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if an explicit id is taken, or
    /// [`StoreError::Database`] on query failure.
    fn insert(
        &self,
        product: NewProduct,
    ) -> Pin<Box<dyn Future<Output = Result<Product, StoreError>> + Send + '_>>;

    /// Write the full row.
    ///
    /// With `expected_version == Some(v)` the write only applies if the stored
    /// version is still `v`. With `None` the write is unconditional. Either way
    /// the stored version is incremented and the written row is returned.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`] when the expected version is stale
    /// - [`StoreError::Missing`] when the row does not exist
    /// - [`StoreError::Constraint`] when the row would violate a constraint
    /// - [`StoreError::Database`] on query failure
    fn update(
        &self,
        product: &Product,
        expected_version: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Product, StoreError>> + Send + '_>>;

    /// Delete a row. Deleting an absent row succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn delete(&self, id: ProductId) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;
}
