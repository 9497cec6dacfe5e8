//! Router configuration.

use super::state::AppState;
use crate::api::stock;
use axum::{
    Router,
    routing::{get, post},
};
use stockroom_web::{health_check, request_context_layer};

/// Build the complete Axum router.
///
/// Every route runs inside the request-context layer (request id, span,
/// access log, request counter).
pub fn build_router(state: AppState) -> Router {
    let product_routes = Router::new()
        .route("/:id/stock", get(stock::get_stock))
        .route("/reserve", post(stock::reserve))
        .route("/release", post(stock::release));

    Router::new()
        .route("/health", get(health_check))
        .nest("/product", product_routes)
        .with_state(state)
        .layer(request_context_layer())
}
