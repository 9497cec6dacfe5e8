//! # Stockroom Core
//!
//! Domain types and infrastructure traits for the Stockroom inventory service.
//!
//! This crate owns the vocabulary shared by every other crate in the workspace:
//!
//! - **Product**: the stock counter and its catalog attributes ([`product`])
//! - **Order**: the payload carried by order lifecycle events ([`order`])
//! - **Cache**: key/value store with a fixed expiry ([`cache`])
//! - **`ProductStore`**: the authoritative persistent store ([`store`])
//! - **`ReservationLedger`**: what each order actually holds ([`ledger`])
//! - **`EventBus`**: the order-event transport ([`event_bus`])
//! - **`InventoryError`**: the error taxonomy callers map to responses ([`error`])
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐     ┌────────────────┐
//! │ HTTP Surface  │     │ Event Consumer │
//! └───────┬───────┘     └────────┬───────┘
//!         │                      │
//!         └──────────┬───────────┘
//!                    ▼
//!         ┌─────────────────────┐
//!         │ Reservation Engine  │  ← per-product serialization
//!         └──────────┬──────────┘
//!                    ▼
//!         ┌─────────────────────┐
//!         │    Stock Store      │  ← cache-aside read, write-through write
//!         └─────┬─────────┬─────┘
//!               ▼         ▼
//!          ┌───────┐ ┌──────────┐
//!          │ Cache │ │ Postgres │  ← source of truth
//!          └───────┘ └──────────┘
//! ```
//!
//! Infrastructure implementations live in sibling crates (`stockroom-redis`,
//! `stockroom-postgres`, `stockroom-redpanda`); in-memory doubles live in
//! `stockroom-testing`.

pub mod cache;
pub mod deadline;
pub mod environment;
pub mod error;
pub mod event_bus;
pub mod ledger;
pub mod order;
pub mod product;
pub mod store;

// Re-export commonly used types
pub use cache::{Cache, CacheError};
pub use deadline::Deadline;
pub use environment::{Clock, SystemClock};
pub use error::InventoryError;
pub use event_bus::{EventBus, EventBusError, EventStream, OrderMessage};
pub use ledger::{HoldState, LedgerError, LineKey, ReservationLedger};
pub use order::{Order, OrderEventKind, OrderId, OrderLine};
pub use product::{NewProduct, Product, ProductId};
pub use store::{ProductStore, StoreError};
