//! Event handler trait and order-event decoding.
//!
//! [`EventHandler`] is the seam between the generic
//! [`EventConsumer`](super::EventConsumer) loop and the inventory logic. Two
//! implementations exist:
//!
//! - [`OrderEventHandler`](super::OrderEventHandler): processes each event inline
//! - [`LaneDispatcher`](super::LaneDispatcher): routes events onto parallel lanes

use crate::metrics;
use async_trait::async_trait;
use stockroom_core::{Order, OrderEventKind, OrderMessage};
use tracing::{error, warn};

/// Error type returned by handlers. Logged by the consumer, never fatal.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handler for raw messages from the event bus.
///
/// Implementors must be `Send + Sync + 'static` because handlers are shared
/// across async tasks.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one message.
    ///
    /// # Errors
    ///
    /// Returns an error when the message could not be handed off or processed.
    /// The consumer logs it and moves on to the next message.
    async fn handle(&self, message: &OrderMessage) -> Result<(), HandlerError>;
}

/// A decoded order lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    /// Event type from the message key
    pub kind: OrderEventKind,
    /// Decoded payload
    pub order: Order,
}

/// Decode a message, or drop it.
///
/// Malformed payloads and unknown event types are logged, counted and
/// returned as `None`. They are never retried.
#[must_use]
pub fn decode(message: &OrderMessage) -> Option<OrderEvent> {
    let kind = OrderEventKind::from_key(&message.key);

    let order = match Order::from_json(&message.payload) {
        Ok(order) => order,
        Err(e) => {
            error!(
                key = %message.key,
                topic = %message.topic,
                offset = ?message.offset,
                error = %e,
                "Dropping order event with malformed payload"
            );
            metrics::record_order_event(kind.as_str(), "malformed");
            return None;
        }
    };

    if let OrderEventKind::Unknown(event_type) = &kind {
        warn!(
            key = %message.key,
            event_type = %event_type,
            order_id = ?order.id,
            "Ignoring unknown order event type"
        );
        metrics::record_order_event(event_type, "ignored");
        return None;
    }

    Some(OrderEvent { kind, order })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use stockroom_core::{OrderId, ProductId};

    fn message(key: &str, payload: &str) -> OrderMessage {
        OrderMessage::new(key, payload.as_bytes().to_vec())
    }

    #[test]
    fn decodes_created_event() {
        let event = decode(&message(
            "order.created",
            r#"{"id": 3, "product_requests": [{"product_id": 1, "quantity": 5}]}"#,
        ));

        let event = event.unwrap_or_else(|| panic!("expected an event"));
        assert_eq!(event.kind, OrderEventKind::Created);
        assert_eq!(event.order.id, Some(OrderId::new(3)));
        assert_eq!(event.order.product_requests[0].product_id, ProductId::new(1));
    }

    #[test]
    fn malformed_payload_is_dropped() {
        assert!(decode(&message("order.created", "{\"id\": ")).is_none());
        assert!(decode(&message("order.cancelled", "[]")).is_none());
    }

    #[test]
    fn unknown_event_type_is_dropped() {
        let payload = r#"{"id": 3, "product_requests": []}"#;
        assert!(decode(&message("order.shipped", payload)).is_none());
        assert!(decode(&message("order", payload)).is_none());
    }
}
