//! Parallel, order-preserving dispatch of order events.
//!
//! ```text
//!                         ┌─▶ lane 0 ─▶ OrderEventHandler
//!   stream ─▶ decode ─▶ hash(order id) ─▶ lane 1 ─▶ OrderEventHandler
//!                         └─▶ lane N ─▶ OrderEventHandler
//! ```
//!
//! Both events of an order land on the same lane and run in arrival order.
//! Orders without an id share one lane.
//! Lanes run concurrently; same-product work across lanes is serialized by
//! the reservation engine. Each lane has a bounded queue, so a slow lane
//! back-pressures the stream.
//!
//! The broker commits an event once it is queued here. Queued events survive
//! a graceful shutdown (workers drain before exiting) but not a crash.

use super::handler::{EventHandler, HandlerError, OrderEvent, decode};
use super::order_handler::OrderEventHandler;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use stockroom_core::{OrderId, OrderMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Routes decoded events onto per-order lanes.
///
/// Dropping the dispatcher closes every lane; workers finish what is queued
/// and exit.
pub struct LaneDispatcher {
    lanes: Vec<mpsc::Sender<OrderEvent>>,
}

impl LaneDispatcher {
    /// Start `lanes` workers, each with a queue of `buffer` events.
    ///
    /// Returns the dispatcher and the worker handles to await on shutdown.
    #[must_use]
    pub fn spawn(
        handler: Arc<OrderEventHandler>,
        lanes: usize,
        buffer: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (senders, workers): (Vec<_>, Vec<_>) = (0..lanes.max(1))
            .map(|lane| {
                let (tx, rx) = mpsc::channel(buffer.max(1));
                (tx, tokio::spawn(run_lane(lane, Arc::clone(&handler), rx)))
            })
            .unzip();

        (Self { lanes: senders }, workers)
    }

    /// Number of lanes.
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Lane that owns `order_id`.
    #[must_use]
    pub fn lane_for(&self, order_id: Option<OrderId>) -> usize {
        let mut hasher = DefaultHasher::new();
        order_id.hash(&mut hasher);
        let lanes = u64::try_from(self.lanes.len()).unwrap_or(1).max(1);
        usize::try_from(hasher.finish() % lanes).unwrap_or(0)
    }

    /// Queue an event on its lane, waiting while the lane is full.
    ///
    /// # Errors
    ///
    /// Returns an error if the lane worker has stopped.
    pub async fn dispatch(&self, event: OrderEvent) -> Result<(), HandlerError> {
        let lane = self.lane_for(event.order.id);
        let sender = self
            .lanes
            .get(lane)
            .ok_or_else(|| format!("lane {lane} does not exist"))?;

        sender
            .send(event)
            .await
            .map_err(|e| format!("lane {lane} stopped; dropping event for order {:?}", e.0.order.id).into())
    }
}

#[async_trait]
impl EventHandler for LaneDispatcher {
    async fn handle(&self, message: &OrderMessage) -> Result<(), HandlerError> {
        match decode(message) {
            Some(event) => self.dispatch(event).await,
            None => Ok(()),
        }
    }
}

async fn run_lane(lane: usize, handler: Arc<OrderEventHandler>, mut events: mpsc::Receiver<OrderEvent>) {
    debug!(lane, "Lane started");
    while let Some(event) = events.recv().await {
        handler.process(&event).await;
    }
    debug!(lane, "Lane drained");
}
