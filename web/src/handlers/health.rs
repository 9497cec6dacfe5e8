//! Health check endpoint.
//!
//! Used by load balancers for liveness. Does not touch the cache, the store
//! or the broker.

use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};

/// Health response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: String,
    /// Crate version of the running binary.
    pub version: String,
}

/// Liveness endpoint.
///
/// ```text
/// GET /health  ->  200 {"status": "ok", "version": "0.1.0"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
