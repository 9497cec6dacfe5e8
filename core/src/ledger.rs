//! Reservation ledger: what each order actually holds.
//!
//! Stock is a single counter, so without a ledger a release cannot tell
//! whether the units it returns were ever reserved. The ledger records one
//! entry per line item that the event consumer reserved, keyed by
//! [`LineKey`]:
//!
//! ```text
//!   (none) ──reserve ok──▶ Held { quantity } ──release──▶ Released { quantity }
//! ```
//!
//! Entries are never removed, so a redelivered `created` event finds the
//! existing entry and does nothing, and a `cancelled` event only returns units
//! that are currently `Held`.
//!
//! # Implementations
//!
//! - `PostgresReservationLedger` (in `stockroom-postgres`) - production
//! - `InMemoryLedger` (in `stockroom-testing`) - tests

use crate::order::OrderId;
use crate::product::ProductId;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Identity of one line item within an order.
///
/// An order may list the same product more than once, so the key carries the
/// occurrence of the product within the order (0 for its first line, 1 for
/// the second, ...). A redelivered or cancelled event with the same lines
/// yields the same keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineKey {
    /// Owning order
    pub order_id: OrderId,
    /// Product on the line
    pub product_id: ProductId,
    /// Earlier lines of the same order with the same product
    pub occurrence: u32,
}

impl LineKey {
    /// Key for the `occurrence`-th line of `product_id` in `order_id`.
    #[must_use]
    pub const fn new(order_id: OrderId, product_id: ProductId, occurrence: u32) -> Self {
        Self {
            order_id,
            product_id,
            occurrence,
        }
    }

    /// Key for the first (usually only) line of `product_id` in `order_id`.
    #[must_use]
    pub const fn first(order_id: OrderId, product_id: ProductId) -> Self {
        Self::new(order_id, product_id, 0)
    }
}

/// State of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    /// Units reserved for the order and not yet returned
    Held {
        /// Units held
        quantity: i64,
    },
    /// Units that were held and have been returned
    Released {
        /// Units that were returned
        quantity: i64,
    },
}

/// Errors raised by ledger implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Database connection or query error.
    #[error("Ledger database error: {0}")]
    Database(String),
}

/// Durable record of per-order reservations.
pub trait ReservationLedger: Send + Sync {
    /// Look up the entry for a line item.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on storage failure.
    fn get(&self, line: LineKey) -> Pin<Box<dyn Future<Output = Result<Option<HoldState>, LedgerError>> + Send + '_>>;

    /// Record that `quantity` units are held for the line item.
    ///
    /// Returns `false` (and changes nothing) if an entry already exists.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on storage failure.
    fn hold(
        &self,
        line: LineKey,
        quantity: i64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, LedgerError>> + Send + '_>>;

    /// Transition a `Held` entry to `Released`.
    ///
    /// Returns the held quantity if the entry was `Held`, `None` if it was
    /// absent or already released.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on storage failure.
    fn release(&self, line: LineKey) -> Pin<Box<dyn Future<Output = Result<Option<i64>, LedgerError>> + Send + '_>>;
}
