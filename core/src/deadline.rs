//! Caller deadlines.
//!
//! HTTP callers carry a deadline; the event consumer does not. A [`Deadline`]
//! bounds the waiting phases of a stock mutation (lock acquisition, the read)
//! and is checked once more right before the write. Once a write is issued it
//! runs to completion regardless of the deadline.

use crate::error::InventoryError;
use std::time::{Duration, Instant};

/// A point in time after which the caller no longer wants the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline: wait as long as it takes.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// Deadline at a fixed instant.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// The deadline instant, if any.
    #[must_use]
    pub const fn instant(self) -> Option<Instant> {
        self.0
    }

    /// Time left, `None` when there is no deadline.
    #[must_use]
    pub fn remaining(self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with [`InventoryError::DeadlineExceeded`] if the deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::DeadlineExceeded`] once the deadline has passed.
    pub fn check(self) -> Result<(), InventoryError> {
        if self.is_expired() {
            Err(InventoryError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}
