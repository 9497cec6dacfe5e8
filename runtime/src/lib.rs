//! # Stockroom Runtime
//!
//! Concurrency and resilience primitives shared by the inventory service:
//!
//! - [`keyed_lock`]: one async mutex per key, created on demand and dropped
//!   when nobody holds or waits on it. Serializes stock mutations per product.
//! - [`retry`]: exponential backoff for transient failures (optimistic
//!   concurrency conflicts, dependency outages).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod keyed_lock;
pub mod retry;

pub use keyed_lock::{KeyedGuard, KeyedLocks};
pub use retry::{RetryPolicy, retry_if};
