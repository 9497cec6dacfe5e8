//! Generic event bus consumer with automatic reconnection.
//!
//! # Pattern: Subscribe-Process-Reconnect Loop
//!
//! ```text
//! loop {
//!     subscribe(topics)
//!         loop {
//!             next message -> handler.handle()
//!             errors are logged, never fatal
//!         }
//!     stream ended / subscribe failed -> sleep(retry_delay)
//! } until shutdown
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::new(
//!     "order-events",
//!     vec!["orders".to_string()],
//!     event_bus,
//!     dispatcher,
//!     shutdown_rx,
//! )
//! .with_retry_delay(Duration::from_secs(5));
//!
//! let handle = consumer.spawn();
//! ```

use super::handler::EventHandler;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use stockroom_core::{EventBus, EventStream};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Generic event bus consumer.
///
/// Runs until a shutdown signal arrives (or the shutdown sender is dropped).
/// The handler is dropped when the consumer stops, which lets a
/// [`LaneDispatcher`](super::LaneDispatcher) drain its lanes.
pub struct EventConsumer {
    /// Consumer name (for logging)
    name: String,
    /// Topics to subscribe to
    topics: Vec<String>,
    /// Event bus to consume from
    event_bus: Arc<dyn EventBus>,
    /// Handler for each message
    handler: Arc<dyn EventHandler>,
    /// Shutdown signal receiver
    shutdown: broadcast::Receiver<()>,
    /// Delay before resubscribing (default: 5 seconds)
    retry_delay: Duration,
}

impl EventConsumer {
    /// Create a new event consumer with the default retry delay (5 seconds).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topics: Vec<String>,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn EventHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            topics,
            event_bus,
            handler,
            shutdown,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Set custom retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(consumer = %self.name, topics = ?self.topics, "Event consumer started");

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal");
                    break;
                }
                subscribe_result = self.event_bus.subscribe(&topics) => {
                    match subscribe_result {
                        Ok(mut stream) => {
                            info!(consumer = %self.name, topics = ?self.topics, "Subscribed to event bus");

                            if self.process_stream(&mut stream).await == StreamEnd::Shutdown {
                                break;
                            }

                            warn!(
                                consumer = %self.name,
                                retry_delay_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX),
                                "Event stream ended, reconnecting"
                            );
                        }
                        Err(e) => {
                            error!(
                                consumer = %self.name,
                                error = %e,
                                retry_delay_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX),
                                "Failed to subscribe to event bus"
                            );
                        }
                    }

                    if self.pause_before_retry().await == StreamEnd::Shutdown {
                        break;
                    }
                }
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    /// Process messages until the stream ends or shutdown is signalled.
    async fn process_stream(&mut self, stream: &mut EventStream) -> StreamEnd {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal during processing");
                    return StreamEnd::Shutdown;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            if let Err(e) = self.handler.handle(&message).await {
                                error!(
                                    consumer = %self.name,
                                    key = %message.key,
                                    offset = ?message.offset,
                                    error = %e,
                                    "Failed to handle message"
                                );
                            }
                        }
                        Some(Err(e)) => {
                            error!(consumer = %self.name, error = %e, "Error receiving message from stream");
                        }
                        None => return StreamEnd::Closed,
                    }
                }
            }
        }
    }

    async fn pause_before_retry(&mut self) -> StreamEnd {
        tokio::select! {
            _ = self.shutdown.recv() => StreamEnd::Shutdown,
            () = tokio::time::sleep(self.retry_delay) => StreamEnd::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Closed,
    Shutdown,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::consumer::{LaneDispatcher, OrderEventHandler};
    use crate::repository::StockStore;
    use crate::service::ReservationEngine;
    use stockroom_core::{OrderMessage, ProductId};
    use stockroom_testing::{InMemoryCache, InMemoryEventBus, InMemoryLedger, InMemoryProductStore};

    struct Harness {
        bus: Arc<InMemoryEventBus>,
        store: Arc<InMemoryProductStore>,
        shutdown: broadcast::Sender<()>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(handler: impl FnOnce(Arc<OrderEventHandler>) -> Arc<dyn EventHandler>) -> Harness {
        let bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryProductStore::seeded());
        let cache = Arc::new(InMemoryCache::new(Duration::from_secs(120)));
        let engine = Arc::new(ReservationEngine::new(StockStore::new(cache, store.clone())));
        let orders = Arc::new(OrderEventHandler::new(engine, Arc::new(InMemoryLedger::new())));
        let (shutdown, shutdown_rx) = broadcast::channel(1);

        let handle = EventConsumer::new(
            "test-consumer",
            vec!["orders".to_string()],
            bus.clone(),
            handler(orders),
            shutdown_rx,
        )
        .with_retry_delay(Duration::from_millis(10))
        .spawn();

        Harness { bus, store, shutdown, handle }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("condition not reached in time"));
    }

    fn created(order_id: i64, quantity: i64) -> OrderMessage {
        let payload = format!(
            r#"{{"id": {order_id}, "product_requests": [{{"product_id": 1, "quantity": {quantity}}}]}}"#
        );
        OrderMessage::new("order.created", payload.into_bytes())
    }

    #[tokio::test]
    async fn consumes_and_stops_on_shutdown() {
        let h = start(|orders| orders);
        wait_until(|| h.bus.subscriber_count("orders") == 1).await;

        h.bus.publish("orders", &created(1, 5)).await.unwrap();
        wait_until(|| h.store.stock_of(ProductId::new(1)) == Some(45)).await;

        h.shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), h.handle)
            .await
            .expect("consumer should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn resubscribes_after_the_stream_ends() {
        let h = start(|orders| orders);
        wait_until(|| h.bus.subscriber_count("orders") == 1).await;

        h.bus.disconnect_all();
        wait_until(|| h.bus.subscriber_count("orders") == 1).await;

        h.bus.publish("orders", &created(2, 3)).await.unwrap();
        wait_until(|| h.store.stock_of(ProductId::new(1)) == Some(47)).await;

        drop(h.shutdown);
        tokio::time::timeout(Duration::from_secs(5), h.handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bad_messages_do_not_stop_the_loop() {
        let h = start(|orders| {
            let (dispatcher, _workers) = LaneDispatcher::spawn(orders, 2, 4);
            Arc::new(dispatcher)
        });
        wait_until(|| h.bus.subscriber_count("orders") == 1).await;

        h.bus.publish("orders", &OrderMessage::new("order.created", b"garbage".to_vec())).await.unwrap();
        h.bus.publish("orders", &OrderMessage::new("order.refunded", b"{}".to_vec())).await.unwrap();
        h.bus.publish("orders", &created(3, 10)).await.unwrap();

        wait_until(|| h.store.stock_of(ProductId::new(1)) == Some(40)).await;
        h.shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), h.handle).await.unwrap().unwrap();
    }
}
