//! Order-event consumption.
//!
//! - [`EventConsumer`]: subscribe-process-reconnect loop over an [`EventBus`](stockroom_core::EventBus)
//! - [`LaneDispatcher`]: parallel lanes keyed by order id
//! - [`OrderEventHandler`]: applies `created` / `cancelled` events to stock

mod event_consumer;
mod handler;
mod lanes;
mod order_handler;

pub use event_consumer::EventConsumer;
pub use handler::{EventHandler, HandlerError, OrderEvent, decode};
pub use lanes::LaneDispatcher;
pub use order_handler::{LineOutcome, OrderEventHandler};
