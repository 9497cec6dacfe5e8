//! Axum integration for Stockroom.
//!
//! The imperative shell around the reservation engine:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  HTTP (Axum)                             │  ← request id, deadline, JSON
//! │  - extract path/body/Request-Timeout-Ms  │
//! │  - map InventoryError -> AppError        │
//! ├──────────────────────────────────────────┤
//! │  Reservation engine                      │  ← lives in stockroom-inventory
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. [`middleware::request_context_layer`] assigns a request id and opens a span
//! 2. [`extractors::RequestDeadline`] turns `Request-Timeout-Ms` into a deadline
//! 3. The handler calls the engine
//! 4. Errors convert into [`AppError`] and render as `{"code", "message"}`

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{DeadlinePolicy, REQUEST_TIMEOUT_HEADER, RequestDeadline, RequestId};
pub use handlers::{HealthResponse, health_check};
pub use middleware::{REQUEST_ID_HEADER, request_context_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
