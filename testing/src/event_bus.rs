//! Channel-backed event bus.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use stockroom_core::event_bus::{EventBus, EventBusError, EventStream, OrderMessage};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Topics {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<OrderMessage>>>,
    offsets: HashMap<String, i64>,
    published: Vec<OrderMessage>,
}

/// In-process [`EventBus`].
///
/// Every subscriber of a topic receives every message published to it after
/// the subscription was made, tagged with the topic and a per-topic offset
/// (partition 0). Published messages are also recorded for assertions.
///
/// # Example
///
/// ```
/// use stockroom_testing::InMemoryEventBus;
/// use stockroom_core::{EventBus, OrderMessage};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let mut stream = bus.subscribe(&["orders"]).await?;
///
/// bus.publish("orders", &OrderMessage::new("order.created", b"{}".to_vec())).await?;
///
/// let received = stream.next().await.transpose()?;
/// assert_eq!(received.map(|m| m.offset), Some(Some(0)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    topics: Arc<RwLock<Topics>>,
}

impl InMemoryEventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<OrderMessage> {
        crate::read(&self.topics).published.clone()
    }

    /// Number of live subscriptions to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        crate::read(&self.topics)
            .subscribers
            .get(topic)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// End every open subscription stream, as a broker disconnect would.
    pub fn disconnect_all(&self) {
        crate::write(&self.topics).subscribers.clear();
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        message: &OrderMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        {
            let mut topics = crate::write(&self.topics);
            let offset = topics.offsets.entry(topic.to_string()).or_insert(0);
            let delivered = message.clone().with_source(topic, 0, *offset);
            *offset += 1;

            if let Some(senders) = topics.subscribers.get_mut(topic) {
                senders.retain(|tx| tx.send(delivered.clone()).is_ok());
            }
            topics.published.push(delivered);
        }
        Box::pin(async { Ok(()) })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut state = crate::write(&self.topics);
            for topic in topics {
                state
                    .subscribers
                    .entry((*topic).to_string())
                    .or_default()
                    .push(tx.clone());
            }
        }

        Box::pin(async move {
            let stream = async_stream::stream! {
                while let Some(message) = rx.recv().await {
                    yield Ok(message);
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
