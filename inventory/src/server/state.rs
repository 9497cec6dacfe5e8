//! Application state for the HTTP server.

use crate::service::ReservationEngine;
use axum::extract::FromRef;
use std::sync::Arc;
use stockroom_web::DeadlinePolicy;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via `Arc`) for each request.
#[derive(Clone)]
pub struct AppState {
    /// The single owner of stock mutations, shared with the event consumer
    pub engine: Arc<ReservationEngine>,

    /// Cap applied to caller-supplied request deadlines
    pub deadlines: DeadlinePolicy,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(engine: Arc<ReservationEngine>, deadlines: DeadlinePolicy) -> Self {
        Self { engine, deadlines }
    }
}

// Lets the `RequestDeadline` extractor find the policy.
impl FromRef<AppState> for DeadlinePolicy {
    fn from_ref(state: &AppState) -> Self {
        state.deadlines
    }
}
