//! Stock query and mutation endpoints.

use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use stockroom_core::ProductId;
use stockroom_web::{AppError, RequestDeadline};
use tracing::debug;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body of `POST /product/reserve` and `POST /product/release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    /// Product to adjust
    pub product_id: ProductId,
    /// Units to take or return; must be positive
    pub quantity: i64,
}

/// Response for the stock query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockResponse {
    /// Units on hand
    pub stock: i64,
}

/// Confirmation returned by the mutation endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable confirmation
    pub message: String,
}

impl MessageResponse {
    fn reserved() -> Self {
        Self {
            message: "Product stock reserved successfully".to_string(),
        }
    }

    fn released() -> Self {
        Self {
            message: "Product stock released successfully".to_string(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the current stock of a product.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/product/1/stock
/// ```
///
/// Response:
/// ```json
/// { "stock": 50 }
/// ```
///
/// # Errors
///
/// 400 for an id that is not a positive integer, 404 for an unknown product,
/// 500 when the cache or the store fails.
pub async fn get_stock(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<StockResponse>, AppError> {
    let id = parse_product_id(&raw_id)?;
    let stock = state.engine.get_stock(id).await?;
    Ok(Json(StockResponse { stock }))
}

/// Take units out of stock.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/product/reserve \
///   -H 'Content-Type: application/json' \
///   -H 'Request-Timeout-Ms: 2000' \
///   -d '{"product_id": 1, "quantity": 10}'
/// ```
///
/// # Errors
///
/// 400 for a malformed body, a non-positive quantity or insufficient stock;
/// 404 for an unknown product; 408 when the deadline passes first.
pub async fn reserve(
    State(state): State<AppState>,
    RequestDeadline(deadline): RequestDeadline,
    body: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = body.map_err(reject_body)?;

    state
        .engine
        .try_reserve(request.product_id, request.quantity, deadline)
        .await?;
    Ok(Json(MessageResponse::reserved()))
}

/// Return units to stock.
///
/// Not tied to any earlier reservation.
///
/// # Errors
///
/// 400 for a malformed body or a non-positive quantity; 404 for an unknown
/// product; 408 when the deadline passes first.
pub async fn release(
    State(state): State<AppState>,
    RequestDeadline(deadline): RequestDeadline,
    body: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = body.map_err(reject_body)?;

    state
        .engine
        .release(request.product_id, request.quantity, deadline)
        .await?;
    Ok(Json(MessageResponse::released()))
}

fn parse_product_id(raw: &str) -> Result<ProductId, AppError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(ProductId::new(id)),
        _ => Err(AppError::bad_request(format!("Invalid product id '{raw}'"))),
    }
}

fn reject_body(rejection: JsonRejection) -> AppError {
    debug!(error = %rejection.body_text(), "Rejected request body");
    AppError::bad_request(format!("Invalid request body: {}", rejection.body_text()))
}
