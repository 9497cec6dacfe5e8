//! Event bus abstraction for the order-event stream.
//!
//! The inventory core consumes order lifecycle events published by the order
//! service. It only needs two things from the transport: "deliver me
//! ordered-enough messages with a key and a payload" and, for tooling and
//! tests, "publish a message".
//!
//! # Message Shape
//!
//! ```text
//! key:     "<namespace>.<event-type>"     e.g. "order.created"
//! payload: JSON-encoded Order
//! ```
//!
//! # Delivery Semantics
//!
//! - **At-least-once**: the same message may be delivered more than once
//! - **Ordered within partition**: messages with the same key keep their order
//! - **Idempotency**: handlers must tolerate duplicates (see the reservation ledger)
//!
//! # Implementations
//!
//! - `RedpandaEventBus` (in `stockroom-redpanda`) - production (Kafka-compatible)
//! - `InMemoryEventBus` (in `stockroom-testing`) - tests

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received message could not be turned into an [`OrderMessage`]
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A raw message from the order-event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMessage {
    /// Routing key, `<namespace>.<event-type>`
    pub key: String,
    /// Raw payload (JSON order document)
    pub payload: Vec<u8>,
    /// Topic the message was read from (empty for messages not yet published)
    pub topic: String,
    /// Partition the message was read from, if known
    pub partition: Option<i32>,
    /// Offset within the partition, if known
    pub offset: Option<i64>,
}

impl OrderMessage {
    /// Create an outbound message.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
            topic: String::new(),
            partition: None,
            offset: None,
        }
    }

    /// Attach the source position of a received message.
    #[must_use]
    pub fn with_source(mut self, topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        self.topic = topic.into();
        self.partition = Some(partition);
        self.offset = Some(offset);
        self
    }
}

/// Stream of messages from subscriptions.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<OrderMessage, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so the
/// trait can be used as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish a message to a topic, partitioned by its key.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        topic: &str,
        message: &OrderMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of messages.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
