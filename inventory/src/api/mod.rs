//! HTTP API handlers.
//!
//! Handlers are thin: parse the request, resolve the caller's deadline, call
//! the [`ReservationEngine`](crate::service::ReservationEngine) and map its
//! errors to [`AppError`](stockroom_web::AppError).
//!
//! - `GET  /product/:id/stock` ([`stock::get_stock`])
//! - `POST /product/reserve` ([`stock::reserve`])
//! - `POST /product/release` ([`stock::release`])

pub mod stock;
