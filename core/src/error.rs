//! Error taxonomy for inventory operations.
//!
//! | Variant              | Meaning                                   | HTTP | Consumer            |
//! |----------------------|-------------------------------------------|------|---------------------|
//! | `NotFound`           | product id unknown to the store           | 404  | log, drop item      |
//! | `InvalidInput`       | malformed id/body, non-positive quantity  | 400  | log, drop item      |
//! | `InsufficientStock`  | reservation exceeds available stock       | 400  | log (declined)      |
//! | `DependencyFailure`  | cache, store or ledger call failed        | 500  | retry, then drop    |
//! | `Conflict`           | row changed concurrently, retries exhausted | 500 | retry, then drop    |
//! | `InvariantViolation` | persisted stock observed negative         | 500  | log, drop item      |
//! | `DeadlineExceeded`   | caller deadline passed before the write   | 408  | n/a                 |

use crate::cache::CacheError;
use crate::ledger::LedgerError;
use crate::product::ProductId;
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by the stock store and the reservation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Product id unknown to the store.
    #[error("Product {0} not found")]
    NotFound(ProductId),

    /// Request rejected before touching any store.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reservation exceeds available stock. A normal business outcome.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Product that was short
        product_id: ProductId,
        /// Units requested
        requested: i64,
        /// Units on hand at the time of the check
        available: i64,
    },

    /// A cache, store or ledger call failed.
    #[error("Dependency failure: {0}")]
    DependencyFailure(String),

    /// The product row changed between read and write.
    #[error("Concurrent modification of product {0}")]
    Conflict(ProductId),

    /// Observed state that the engine's own writes can never produce.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The caller's deadline passed before the write was issued.
    #[error("Deadline exceeded before the operation could complete")]
    DeadlineExceeded,
}

impl InventoryError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DependencyFailure(_) | Self::Conflict(_))
    }
}

impl From<CacheError> for InventoryError {
    fn from(err: CacheError) -> Self {
        Self::DependencyFailure(err.to_string())
    }
}

impl From<LedgerError> for InventoryError {
    fn from(err: LedgerError) -> Self {
        Self::DependencyFailure(err.to_string())
    }
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { id, .. } => Self::Conflict(id),
            StoreError::Missing(id) => Self::NotFound(id),
            StoreError::Duplicate(id) => Self::InvalidInput(format!("Product {id} already exists")),
            StoreError::Constraint(reason) => Self::InvariantViolation(reason),
            StoreError::Database(reason) => Self::DependencyFailure(reason),
        }
    }
}
