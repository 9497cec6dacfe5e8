//! In-memory reservation ledger.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use stockroom_core::ledger::{HoldState, LedgerError, LineKey, ReservationLedger};

/// [`ReservationLedger`] over a `HashMap` keyed by [`LineKey`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    holds: Arc<RwLock<HashMap<LineKey, HoldState>>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a line item, read synchronously.
    #[must_use]
    pub fn entry(&self, line: LineKey) -> Option<HoldState> {
        crate::read(&self.holds).get(&line).copied()
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        crate::read(&self.holds).len()
    }

    /// Whether the ledger has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReservationLedger for InMemoryLedger {
    fn get(&self, line: LineKey) -> Pin<Box<dyn Future<Output = Result<Option<HoldState>, LedgerError>> + Send + '_>> {
        let entry = self.entry(line);
        Box::pin(async move { Ok(entry) })
    }

    fn hold(
        &self,
        line: LineKey,
        quantity: i64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, LedgerError>> + Send + '_>> {
        let inserted = {
            let mut holds = crate::write(&self.holds);
            match holds.entry(line) {
                std::collections::hash_map::Entry::Occupied(_) => false,
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(HoldState::Held { quantity });
                    true
                }
            }
        };
        Box::pin(async move { Ok(inserted) })
    }

    fn release(&self, line: LineKey) -> Pin<Box<dyn Future<Output = Result<Option<i64>, LedgerError>> + Send + '_>> {
        let released = {
            let mut holds = crate::write(&self.holds);
            match holds.get_mut(&line) {
                Some(state) => match *state {
                    HoldState::Held { quantity } => {
                        *state = HoldState::Released { quantity };
                        Some(quantity)
                    }
                    HoldState::Released { .. } => None,
                },
                None => None,
            }
        };
        Box::pin(async move { Ok(released) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::order::OrderId;
    use stockroom_core::product::ProductId;

    #[tokio::test]
    async fn hold_is_recorded_once() {
        let ledger = InMemoryLedger::new();
        let line = LineKey::first(OrderId::new(1), ProductId::new(1));

        assert_eq!(ledger.hold(line, 5).await, Ok(true));
        assert_eq!(ledger.hold(line, 7).await, Ok(false));
        assert_eq!(ledger.entry(line), Some(HoldState::Held { quantity: 5 }));
    }

    #[tokio::test]
    async fn release_only_returns_held_quantity_once() {
        let ledger = InMemoryLedger::new();
        let line = LineKey::first(OrderId::new(1), ProductId::new(2));

        assert_eq!(ledger.release(line).await, Ok(None));
        ledger.hold(line, 4).await.unwrap_or_default();
        assert_eq!(ledger.release(line).await, Ok(Some(4)));
        assert_eq!(ledger.release(line).await, Ok(None));
        assert_eq!(ledger.entry(line), Some(HoldState::Released { quantity: 4 }));
    }

    #[tokio::test]
    async fn repeated_product_lines_are_separate_entries() {
        let ledger = InMemoryLedger::new();
        let (order, product) = (OrderId::new(9), ProductId::new(1));

        assert_eq!(ledger.hold(LineKey::new(order, product, 0), 5).await, Ok(true));
        assert_eq!(ledger.get(LineKey::new(order, product, 1)).await, Ok(None));
        assert_eq!(ledger.hold(LineKey::new(order, product, 1), 3).await, Ok(true));
        assert_eq!(ledger.release(LineKey::new(order, product, 1)).await, Ok(Some(3)));
        assert_eq!(ledger.entry(LineKey::new(order, product, 0)), Some(HoldState::Held { quantity: 5 }));
    }
}
