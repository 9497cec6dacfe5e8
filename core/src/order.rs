//! Order event payloads.
//!
//! Order lifecycle events arrive from an external stream as a message key of
//! the form `<namespace>.<event-type>` (e.g. `order.created`) and a JSON
//! [`Order`] payload. Only `product_id` and `quantity` of each line item drive
//! inventory; the pricing fields are carried for completeness.

use crate::product::ProductId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An order as published by the order service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier. Absent on some producers' payloads; such orders
    /// cannot be tracked per line item.
    #[serde(default)]
    pub id: Option<OrderId>,
    /// Ordering customer
    #[serde(default)]
    pub user_id: i64,
    /// Line items, one per product
    pub product_requests: Vec<OrderLine>,
    /// Total quantity across line items
    #[serde(default)]
    pub quantity: i64,
    /// Total price across line items
    #[serde(default)]
    pub total_price: f64,
    /// Order status as seen by the order service (e.g. "pending", "cancelled")
    #[serde(default)]
    pub status: String,
    /// Integrity hash supplied by the order service
    #[serde(default)]
    pub hash_value: String,
}

impl Order {
    /// Parse an order from a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] when the payload is not a
    /// valid order document.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// A single product request within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product to reserve or release
    pub product_id: ProductId,
    /// Units requested
    pub quantity: i64,
    /// Percentage markup on the product price
    #[serde(default)]
    pub markup: f64,
    /// Percentage discount on the product price
    #[serde(default)]
    pub discount: f64,
    /// Final price after markup and discount
    #[serde(default)]
    pub final_price: f64,
    /// Owning order (duplicated by the order service on each line)
    #[serde(default)]
    pub order_id: OrderId,
    /// Integrity hash supplied by the order service
    #[serde(default)]
    pub hash_value: String,
}

impl OrderLine {
    /// Minimal line item with no pricing information.
    #[must_use]
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            markup: 0.0,
            discount: 0.0,
            final_price: 0.0,
            order_id: OrderId::default(),
            hash_value: String::new(),
        }
    }
}

/// Event type carried in the message key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEventKind {
    /// `<namespace>.created` - reserve every line item
    Created,
    /// `<namespace>.cancelled` - release every line item
    Cancelled,
    /// Anything else (including keys without a second segment)
    Unknown(String),
}

impl OrderEventKind {
    /// Classify a message key by its second `.`-separated segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use stockroom_core::order::OrderEventKind;
    ///
    /// assert_eq!(OrderEventKind::from_key("order.created"), OrderEventKind::Created);
    /// assert_eq!(OrderEventKind::from_key("order.cancelled"), OrderEventKind::Cancelled);
    /// assert_eq!(
    ///     OrderEventKind::from_key("order.shipped"),
    ///     OrderEventKind::Unknown("shipped".to_string())
    /// );
    /// ```
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key.split('.').nth(1) {
            Some("created") => Self::Created,
            Some("cancelled") => Self::Cancelled,
            Some(other) => Self::Unknown(other.to_string()),
            None => Self::Unknown(String::new()),
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Cancelled => "cancelled",
            Self::Unknown(other) => other,
        }
    }
}
