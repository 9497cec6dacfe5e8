//! Product domain types.
//!
//! A [`Product`] is the unit of stock tracking. Its `stock` field is the only
//! counter the inventory core mutates; the remaining catalog attributes are
//! carried so the persistent row and the cached snapshot stay whole.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
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

    /// Cache key for this product's snapshot (`product:<id>`).
    #[must_use]
    pub fn cache_key(self) -> String {
        format!("product:{}", self.0)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A catalog product and its stock counter.
///
/// # Invariants
///
/// - `stock >= 0` at every quiescent point
/// - `price` is finite and non-negative
/// - `version` increases by one with every persisted write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Unit price
    pub price: f64,
    /// Sellable units on hand
    pub stock: i64,
    /// Optimistic concurrency version (bumped by the store on every write)
    #[serde(default)]
    pub version: i64,
}

impl Product {
    /// Copy of this product with a different stock level.
    ///
    /// The version is left untouched; the store decides the next version
    /// when the copy is persisted.
    #[must_use]
    pub fn with_stock(&self, stock: i64) -> Self {
        Self {
            stock,
            ..self.clone()
        }
    }
}

/// Input for creating a product.
///
/// `id` is optional: when absent the persistent store assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    /// Externally assigned id, if any
    #[serde(default)]
    pub id: Option<ProductId>,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Unit price
    pub price: f64,
    /// Initial stock
    pub stock: i64,
}

impl NewProduct {
    /// Create a product draft with a store-assigned id.
    #[must_use]
    pub fn new(name: impl Into<String>, price: f64, stock: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            price,
            stock,
        }
    }

    /// Set an explicit id.
    #[must_use]
    pub const fn with_id(mut self, id: ProductId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check the draft against the product invariants.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the name is blank, the price is
    /// negative or not finite, the stock is negative, or an explicit id is
    /// not positive.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Product name must not be empty".to_string());
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(format!("Product price must be a non-negative number, got {}", self.price));
        }
        if self.stock < 0 {
            return Err(format!("Initial stock must not be negative, got {}", self.stock));
        }
        if let Some(id) = self.id {
            if id.get() <= 0 {
                return Err(format!("Product id must be positive, got {id}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_uses_product_prefix() {
        assert_eq!(ProductId::new(42).cache_key(), "product:42");
    }

    #[test]
    fn product_id_serializes_as_plain_integer() {
        let json = serde_json::to_string(&ProductId::new(7)).unwrap_or_default();
        assert_eq!(json, "7");
    }

    #[test]
    fn with_stock_keeps_version() {
        let product = Product {
            id: ProductId::new(1),
            name: "Product A".to_string(),
            description: String::new(),
            price: 100.0,
            stock: 50,
            version: 3,
        };
        let updated = product.with_stock(40);
        assert_eq!(updated.stock, 40);
        assert_eq!(updated.version, 3);
        assert_eq!(updated.name, "Product A");
    }

    #[test]
    fn validate_rejects_bad_drafts() {
        assert!(NewProduct::new("", 1.0, 1).validate().is_err());
        assert!(NewProduct::new("A", -1.0, 1).validate().is_err());
        assert!(NewProduct::new("A", f64::NAN, 1).validate().is_err());
        assert!(NewProduct::new("A", 1.0, -1).validate().is_err());
        assert!(NewProduct::new("A", 1.0, 1).with_id(ProductId::new(0)).validate().is_err());
        assert!(NewProduct::new("A", 0.0, 0).validate().is_ok());
    }
}
