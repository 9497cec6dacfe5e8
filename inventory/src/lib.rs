//! # Stockroom Inventory
//!
//! Inventory consistency core: keeps per-product stock counters correct while
//! two independent entry points mutate them.
//!
//! ```text
//!   HTTP (axum)                      Order events (RedPanda)
//!   GET  /product/:id/stock          order.created   → reserve each line
//!   POST /product/reserve            order.cancelled → release what was held
//!   POST /product/release
//!        │                                  │
//!        │                          EventConsumer ─▶ LaneDispatcher
//!        │                                  │        (lane per order id)
//!        └──────────────┬───────────────────┘
//!                       ▼
//!              ReservationEngine        per-product lock, deadline,
//!                       │               optimistic retry on conflict
//!                       ▼
//!                  StockStore           cache-aside read,
//!                  │        │           write-through write
//!                  ▼        ▼
//!               Redis    PostgreSQL     source of truth
//! ```
//!
//! ## Guarantees
//!
//! - Stock is never negative. A reservation larger than the stock on hand is
//!   declined and changes nothing.
//! - Concurrent reservations of the same product are serialized in-process and
//!   guarded by row versions across processes.
//! - A redelivered `order.created` reserves once per line item;
//!   `order.cancelled` only gives back what the order actually holds.
//! - HTTP releases, and cancellations of orders without an id, are not tied
//!   to any reservation.
//! - Order events are at-least-once until they reach a lane. The broker offset
//!   is committed at that point, so events still queued on a lane are lost if
//!   the process dies without a graceful shutdown; a graceful shutdown drains
//!   every lane before exiting.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod consumer;
pub mod lifecycle;
pub mod metrics;
pub mod repository;
pub mod server;
pub mod service;

pub use bootstrap::{BootstrapError, ResourceManager, build_application};
pub use config::Config;
pub use lifecycle::Application;
pub use repository::StockStore;
pub use service::ReservationEngine;
