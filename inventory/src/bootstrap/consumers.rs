//! Order-event consumer registration.
//!
//! Wires the generic [`EventConsumer`] loop to the inventory logic:
//!
//! ```text
//! EventBus ─▶ EventConsumer ─▶ LaneDispatcher ─▶ N × OrderEventHandler ─▶ ReservationEngine
//! ```

use crate::bootstrap::ResourceManager;
use crate::consumer::{EventConsumer, LaneDispatcher, OrderEventHandler};
use crate::service::ReservationEngine;
use std::sync::Arc;
use std::time::Duration;
use stockroom_runtime::RetryPolicy;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// The order-event consumer plus its already-running lane workers.
pub struct OrderConsumer {
    /// Subscription loop, not yet spawned
    pub consumer: EventConsumer,
    /// Lane workers; they exit once the consumer stops and drops its dispatcher
    pub lane_workers: Vec<JoinHandle<()>>,
}

/// Create the order-event consumer.
///
/// Lane workers start immediately and idle until the consumer is spawned.
#[must_use]
pub fn register_order_consumer(
    resources: &ResourceManager,
    engine: Arc<ReservationEngine>,
    shutdown: broadcast::Receiver<()>,
) -> OrderConsumer {
    let settings = &resources.config.consumer;

    let item_retry = RetryPolicy::builder()
        .max_retries(settings.max_retries)
        .initial_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(2))
        .build();
    let handler = Arc::new(
        OrderEventHandler::new(engine, Arc::clone(&resources.ledger)).with_retry(item_retry),
    );

    let (dispatcher, lane_workers) =
        LaneDispatcher::spawn(handler, settings.lanes, settings.lane_buffer);
    info!(
        lanes = dispatcher.lane_count(),
        lane_buffer = settings.lane_buffer,
        topic = %resources.config.redpanda.order_topic,
        "Order event lanes started"
    );

    let consumer = EventConsumer::new(
        "order-events",
        vec![resources.config.redpanda.order_topic.clone()],
        Arc::clone(&resources.event_bus),
        Arc::new(dispatcher),
        shutdown,
    )
    .with_retry_delay(resources.config.consumer_retry_delay());

    OrderConsumer {
        consumer,
        lane_workers,
    }
}
