//! Order lifecycle events into reservation engine calls.
//!
//! | Event       | Per line item                                                   |
//! |-------------|-----------------------------------------------------------------|
//! | `created`   | skip if the ledger knows the line; else reserve, then hold      |
//! | `cancelled` | claim the hold (`Held` -> `Released`); release what was held    |
//!
//! Lines are keyed by [`LineKey`]: the order id, the product and the
//! occurrence of that product within the order, so an order may list a
//! product more than once. Orders without an id cannot be keyed; their lines
//! go straight to the engine (`created` reserves, `cancelled` releases the
//! requested quantity) with no redelivery protection.
//!
//! Line items are independent: a failing item is retried on its own, then
//! dropped, and never aborts or rolls back its siblings.

use super::handler::{EventHandler, HandlerError, OrderEvent, decode};
use crate::metrics;
use crate::service::ReservationEngine;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stockroom_core::{
    Deadline, HoldState, InventoryError, LineKey, OrderEventKind, OrderId, OrderLine, OrderMessage,
    ProductId, ReservationLedger,
};
use stockroom_runtime::{RetryPolicy, retry_if};
use tracing::{debug, error, info, warn};

/// What happened to one line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Stock taken (and hold recorded when the order has an id)
    Reserved,
    /// Not enough stock; nothing changed
    Declined,
    /// The ledger already had this line; redelivery ignored
    Duplicate,
    /// Units returned to stock
    Released,
    /// Cancellation for a line that was never held
    NotHeld,
    /// Cancellation for a hold that was already released
    AlreadyReleased,
    /// Line item rejected before any I/O (non-positive quantity)
    Skipped,
    /// Gave up after retries, or a non-retryable error
    Failed,
}

/// Applies decoded order events to the engine and the reservation ledger.
pub struct OrderEventHandler {
    engine: Arc<ReservationEngine>,
    ledger: Arc<dyn ReservationLedger>,
    retry: RetryPolicy,
}

impl OrderEventHandler {
    /// Create a handler with the default per-item policy (3 retries).
    #[must_use]
    pub fn new(engine: Arc<ReservationEngine>, ledger: Arc<dyn ReservationLedger>) -> Self {
        Self {
            engine,
            ledger,
            retry: RetryPolicy::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(2))
                .build(),
        }
    }

    /// Replace the per-item retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Process every line item of `event`, returning one outcome per item.
    pub async fn process(&self, event: &OrderEvent) -> Vec<LineOutcome> {
        let order_id = event.order.id;
        let mut outcomes = Vec::with_capacity(event.order.product_requests.len());
        let mut occurrences: HashMap<ProductId, u32> = HashMap::new();

        if order_id.is_none() {
            warn!(
                event_type = event.kind.as_str(),
                "Order event has no order id; applying line items without the reservation ledger"
            );
        }

        for line in &event.order.product_requests {
            let seen = occurrences.entry(line.product_id).or_insert(0);
            let occurrence = *seen;
            *seen += 1;

            let outcome = if line.quantity <= 0 {
                warn!(
                    ?order_id,
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    "Skipping line item with non-positive quantity"
                );
                LineOutcome::Skipped
            } else {
                let key = order_id.map(|id| LineKey::new(id, line.product_id, occurrence));
                match (&event.kind, key) {
                    (OrderEventKind::Created, Some(key)) => self.reserve_line(key, line.quantity).await,
                    (OrderEventKind::Created, None) => self.reserve_untracked(line).await,
                    (OrderEventKind::Cancelled, Some(key)) => self.release_line(key, line.quantity).await,
                    (OrderEventKind::Cancelled, None) => self.release_untracked(line).await,
                    (OrderEventKind::Unknown(_), _) => LineOutcome::Skipped,
                }
            };
            outcomes.push(outcome);
        }

        metrics::record_order_event(event.kind.as_str(), "processed");
        info!(
            ?order_id,
            event_type = event.kind.as_str(),
            lines = outcomes.len(),
            failed = outcomes.iter().filter(|o| **o == LineOutcome::Failed).count(),
            "Order event processed"
        );
        outcomes
    }

    async fn reserve_line(&self, key: LineKey, quantity: i64) -> LineOutcome {
        let LineKey {
            order_id,
            product_id,
            occurrence,
        } = key;

        let existing = self
            .retrying(move || async move { self.ledger.get(key).await.map_err(InventoryError::from) })
            .await;
        match existing {
            Ok(Some(state)) => {
                info!(%order_id, %product_id, occurrence, ?state, "Line item already reserved, ignoring redelivery");
                return LineOutcome::Duplicate;
            }
            Ok(None) => {}
            Err(e) => return dropped(Some(order_id), product_id, "ledger lookup", &e),
        }

        match self.reserve(product_id, quantity).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(%order_id, %product_id, quantity, "Insufficient stock for order line");
                return LineOutcome::Declined;
            }
            Err(e) => return dropped(Some(order_id), product_id, "reserve", &e),
        }

        let recorded = self
            .retrying(move || async move { self.ledger.hold(key, quantity).await.map_err(InventoryError::from) })
            .await;
        match recorded {
            Ok(true) => {
                debug!(%order_id, %product_id, occurrence, quantity, "Hold recorded");
                LineOutcome::Reserved
            }
            Ok(false) => {
                warn!(%order_id, %product_id, quantity, "Hold was recorded concurrently by another delivery");
                LineOutcome::Reserved
            }
            Err(e) => {
                error!(
                    %order_id,
                    %product_id,
                    quantity,
                    error = %e,
                    "Stock reserved but hold not recorded; a cancellation will not return it"
                );
                LineOutcome::Failed
            }
        }
    }

    async fn reserve_untracked(&self, line: &OrderLine) -> LineOutcome {
        let (product_id, quantity) = (line.product_id, line.quantity);

        match self.reserve(product_id, quantity).await {
            Ok(true) => LineOutcome::Reserved,
            Ok(false) => {
                warn!(%product_id, quantity, "Insufficient stock for order line");
                LineOutcome::Declined
            }
            Err(e) => dropped(None, product_id, "reserve", &e),
        }
    }

    async fn release_line(&self, key: LineKey, requested: i64) -> LineOutcome {
        let LineKey {
            order_id,
            product_id,
            ..
        } = key;

        let claimed = self
            .retrying(move || async move { self.ledger.release(key).await.map_err(InventoryError::from) })
            .await;
        let quantity = match claimed {
            Ok(Some(quantity)) => quantity,
            Ok(None) => return self.explain_missing_hold(key).await,
            Err(e) => return dropped(Some(order_id), product_id, "ledger release", &e),
        };

        if quantity != requested {
            debug!(%order_id, %product_id, held = quantity, requested, "Releasing the held quantity");
        }

        match self.release(product_id, quantity).await {
            Ok(()) => LineOutcome::Released,
            Err(e) => {
                error!(
                    %order_id,
                    %product_id,
                    quantity,
                    error = %e,
                    "Hold released but stock could not be returned"
                );
                LineOutcome::Failed
            }
        }
    }

    async fn release_untracked(&self, line: &OrderLine) -> LineOutcome {
        match self.release(line.product_id, line.quantity).await {
            Ok(()) => LineOutcome::Released,
            Err(e) => dropped(None, line.product_id, "release", &e),
        }
    }

    async fn explain_missing_hold(&self, key: LineKey) -> LineOutcome {
        let LineKey {
            order_id,
            product_id,
            ..
        } = key;

        match self.ledger.get(key).await {
            Ok(Some(HoldState::Released { quantity })) => {
                info!(%order_id, %product_id, quantity, "Hold already released, ignoring redelivery");
                LineOutcome::AlreadyReleased
            }
            _ => {
                warn!(%order_id, %product_id, "No hold for cancelled line item, nothing to release");
                LineOutcome::NotHeld
            }
        }
    }

    async fn reserve(&self, product_id: ProductId, quantity: i64) -> Result<bool, InventoryError> {
        self.retrying(move || self.engine.reserve(product_id, quantity, Deadline::none()))
            .await
    }

    async fn release(&self, product_id: ProductId, quantity: i64) -> Result<(), InventoryError> {
        self.retrying(move || async move {
            self.engine
                .release(product_id, quantity, Deadline::none())
                .await
                .map(|_| ())
        })
        .await
    }

    async fn retrying<T, F, Fut>(&self, operation: F) -> Result<T, InventoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InventoryError>>,
    {
        retry_if(&self.retry, operation, InventoryError::is_retryable).await
    }
}

fn dropped(order_id: Option<OrderId>, product_id: ProductId, step: &'static str, err: &InventoryError) -> LineOutcome {
    error!(
        ?order_id,
        %product_id,
        step,
        error = %err,
        "Dropping order line"
    );
    LineOutcome::Failed
}

#[async_trait]
impl EventHandler for OrderEventHandler {
    async fn handle(&self, message: &OrderMessage) -> Result<(), HandlerError> {
        if let Some(event) = decode(message) {
            self.process(&event).await;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repository::StockStore;
    use stockroom_core::Order;
    use stockroom_testing::{FlakyCache, InMemoryCache, InMemoryLedger, InMemoryProductStore};

    struct Fixture {
        handler: OrderEventHandler,
        store: Arc<InMemoryProductStore>,
        ledger: Arc<InMemoryLedger>,
        cache: Arc<FlakyCache<InMemoryCache>>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryProductStore::seeded());
        let cache = Arc::new(FlakyCache::new(InMemoryCache::new(Duration::from_secs(120))));
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = Arc::new(ReservationEngine::new(StockStore::new(cache.clone(), store.clone())));
        let handler = OrderEventHandler::new(engine, ledger.clone()).with_retry(
            RetryPolicy::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
        Fixture { handler, store, ledger, cache }
    }

    fn order_payload(order_id: Option<i64>, lines: &[(i64, i64)]) -> String {
        let lines: Vec<String> = lines
            .iter()
            .map(|(product, quantity)| format!(r#"{{"product_id": {product}, "quantity": {quantity}}}"#))
            .collect();
        match order_id {
            Some(id) => format!(r#"{{"id": {id}, "product_requests": [{}]}}"#, lines.join(",")),
            None => format!(r#"{{"product_requests": [{}]}}"#, lines.join(",")),
        }
    }

    fn event(kind: OrderEventKind, order_id: i64, lines: &[(i64, i64)]) -> OrderEvent {
        OrderEvent {
            kind,
            order: Order::from_json(order_payload(Some(order_id), lines).as_bytes()).unwrap(),
        }
    }

    fn anonymous_event(kind: OrderEventKind, lines: &[(i64, i64)]) -> OrderEvent {
        OrderEvent {
            kind,
            order: Order::from_json(order_payload(None, lines).as_bytes()).unwrap(),
        }
    }

    #[tokio::test]
    async fn created_then_cancelled_restores_stock() {
        let f = fixture();

        let created = f.handler.process(&event(OrderEventKind::Created, 1, &[(1, 5)])).await;
        assert_eq!(created, vec![LineOutcome::Reserved]);
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(45));
        assert_eq!(
            f.ledger.entry(LineKey::first(OrderId::new(1), ProductId::new(1))),
            Some(HoldState::Held { quantity: 5 })
        );

        let cancelled = f.handler.process(&event(OrderEventKind::Cancelled, 1, &[(1, 5)])).await;
        assert_eq!(cancelled, vec![LineOutcome::Released]);
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(50));
    }

    #[tokio::test]
    async fn duplicate_created_reserves_once() {
        let f = fixture();
        let created = event(OrderEventKind::Created, 2, &[(1, 5)]);

        f.handler.process(&created).await;
        let again = f.handler.process(&created).await;

        assert_eq!(again, vec![LineOutcome::Duplicate]);
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(45));
    }

    #[tokio::test]
    async fn cancellation_without_hold_releases_nothing() {
        let f = fixture();

        let outcome = f.handler.process(&event(OrderEventKind::Cancelled, 3, &[(1, 5)])).await;

        assert_eq!(outcome, vec![LineOutcome::NotHeld]);
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(50));
    }

    #[tokio::test]
    async fn duplicate_cancellation_releases_once() {
        let f = fixture();
        f.handler.process(&event(OrderEventKind::Created, 4, &[(2, 10)])).await;
        let cancelled = event(OrderEventKind::Cancelled, 4, &[(2, 10)]);

        f.handler.process(&cancelled).await;
        let again = f.handler.process(&cancelled).await;

        assert_eq!(again, vec![LineOutcome::AlreadyReleased]);
        assert_eq!(f.store.stock_of(ProductId::new(2)), Some(30));
    }

    #[tokio::test]
    async fn cancellation_releases_what_was_held_not_what_was_asked() {
        let f = fixture();
        f.handler.process(&event(OrderEventKind::Created, 5, &[(1, 5)])).await;

        f.handler.process(&event(OrderEventKind::Cancelled, 5, &[(1, 40)])).await;

        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(50));
    }

    #[tokio::test]
    async fn declined_line_records_no_hold_and_cancel_is_a_no_op() {
        let f = fixture();

        let created = f.handler.process(&event(OrderEventKind::Created, 6, &[(2, 31)])).await;
        assert_eq!(created, vec![LineOutcome::Declined]);
        assert!(f.ledger.is_empty());

        let cancelled = f.handler.process(&event(OrderEventKind::Cancelled, 6, &[(2, 31)])).await;
        assert_eq!(cancelled, vec![LineOutcome::NotHeld]);
        assert_eq!(f.store.stock_of(ProductId::new(2)), Some(30));
    }

    #[tokio::test]
    async fn failing_line_does_not_abort_siblings() {
        let f = fixture();

        let outcomes = f
            .handler
            .process(&event(OrderEventKind::Created, 7, &[(999, 1), (1, 2), (2, 0), (2, 3)]))
            .await;

        assert_eq!(
            outcomes,
            vec![
                LineOutcome::Failed,
                LineOutcome::Reserved,
                LineOutcome::Skipped,
                LineOutcome::Reserved
            ]
        );
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(48));
        assert_eq!(f.store.stock_of(ProductId::new(2)), Some(27));
    }

    #[tokio::test]
    async fn transient_cache_failures_are_retried() {
        let f = fixture();
        f.cache.fail_gets(2);

        let outcome = f.handler.process(&event(OrderEventKind::Created, 8, &[(1, 1)])).await;

        assert_eq!(outcome, vec![LineOutcome::Reserved]);
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(49));
    }

    #[tokio::test]
    async fn persistent_failures_are_dropped_after_retries() {
        let f = fixture();
        f.cache.fail_gets(usize::MAX);

        let outcome = f.handler.process(&event(OrderEventKind::Created, 9, &[(1, 1)])).await;

        assert_eq!(outcome, vec![LineOutcome::Failed]);
        assert!(f.ledger.is_empty());
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(50));
    }

    #[tokio::test]
    async fn handle_drops_malformed_and_unknown_messages() {
        let f = fixture();
        let payload = br#"{"id": 10, "product_requests": [{"product_id": 1, "quantity": 5}]}"#.to_vec();

        f.handler.handle(&OrderMessage::new("order.created", b"oops".to_vec())).await.unwrap();
        f.handler.handle(&OrderMessage::new("order.shipped", payload.clone())).await.unwrap();
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(50));

        f.handler.handle(&OrderMessage::new("order.created", payload)).await.unwrap();
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(45));
    }

    #[tokio::test]
    async fn orders_without_id_each_reserve() {
        let f = fixture();
        let created = anonymous_event(OrderEventKind::Created, &[(1, 5)]);

        assert_eq!(f.handler.process(&created).await, vec![LineOutcome::Reserved]);
        assert_eq!(f.handler.process(&created).await, vec![LineOutcome::Reserved]);

        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(40));
        assert!(f.ledger.is_empty());
    }

    #[tokio::test]
    async fn cancellation_without_id_releases_the_requested_quantity() {
        let f = fixture();
        f.handler.process(&anonymous_event(OrderEventKind::Created, &[(1, 5)])).await;

        let cancelled = f.handler.process(&anonymous_event(OrderEventKind::Cancelled, &[(1, 5)])).await;

        assert_eq!(cancelled, vec![LineOutcome::Released]);
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(50));
        assert!(f.ledger.is_empty());
    }

    #[tokio::test]
    async fn order_without_id_still_declines_over_reservation() {
        let f = fixture();

        let outcome = f.handler.process(&anonymous_event(OrderEventKind::Created, &[(2, 31)])).await;

        assert_eq!(outcome, vec![LineOutcome::Declined]);
        assert_eq!(f.store.stock_of(ProductId::new(2)), Some(30));
    }

    #[tokio::test]
    async fn repeated_product_lines_are_each_reserved_and_released() {
        let f = fixture();
        let (order, product) = (OrderId::new(9), ProductId::new(1));

        let created = f.handler.process(&event(OrderEventKind::Created, 9, &[(1, 5), (1, 3)])).await;
        assert_eq!(created, vec![LineOutcome::Reserved, LineOutcome::Reserved]);
        assert_eq!(f.store.stock_of(product), Some(42));
        assert_eq!(f.ledger.entry(LineKey::new(order, product, 0)), Some(HoldState::Held { quantity: 5 }));
        assert_eq!(f.ledger.entry(LineKey::new(order, product, 1)), Some(HoldState::Held { quantity: 3 }));

        let again = f.handler.process(&event(OrderEventKind::Created, 9, &[(1, 5), (1, 3)])).await;
        assert_eq!(again, vec![LineOutcome::Duplicate, LineOutcome::Duplicate]);
        assert_eq!(f.store.stock_of(product), Some(42));

        let cancelled = f.handler.process(&event(OrderEventKind::Cancelled, 9, &[(1, 5), (1, 3)])).await;
        assert_eq!(cancelled, vec![LineOutcome::Released, LineOutcome::Released]);
        assert_eq!(f.store.stock_of(product), Some(50));
    }

    #[tokio::test]
    async fn occurrences_count_per_product_not_per_position() {
        let f = fixture();
        let order = OrderId::new(11);

        f.handler.process(&event(OrderEventKind::Created, 11, &[(1, 2), (2, 4), (1, 6)])).await;

        assert_eq!(
            f.ledger.entry(LineKey::new(order, ProductId::new(1), 1)),
            Some(HoldState::Held { quantity: 6 })
        );
        assert_eq!(
            f.ledger.entry(LineKey::first(order, ProductId::new(2))),
            Some(HoldState::Held { quantity: 4 })
        );
        assert_eq!(f.store.stock_of(ProductId::new(1)), Some(42));
        assert_eq!(f.store.stock_of(ProductId::new(2)), Some(26));
    }
}
