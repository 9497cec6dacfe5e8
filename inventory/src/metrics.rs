//! Inventory metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `stockroom_reservations_total{outcome}` - reserve calls by outcome
//! - `stockroom_releases_total{outcome}` - release calls by outcome
//! - `stockroom_stock_conflicts_total` - optimistic version conflicts on stock writes
//! - `stockroom_order_events_total{event_type,outcome}` - order events by type and outcome
//! - `stockroom_http_requests_total{method,status}` - HTTP requests (recorded by `stockroom-web`)

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use stockroom_core::InventoryError;

/// Reserve calls by outcome.
pub const RESERVATIONS_TOTAL: &str = "stockroom_reservations_total";
/// Release calls by outcome.
pub const RELEASES_TOTAL: &str = "stockroom_releases_total";
/// Optimistic version conflicts on stock writes.
pub const STOCK_CONFLICTS_TOTAL: &str = "stockroom_stock_conflicts_total";
/// Order events by type and outcome.
pub const ORDER_EVENTS_TOTAL: &str = "stockroom_order_events_total";

/// Register all metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_inventory_metrics() {
    describe_counter!(
        RESERVATIONS_TOTAL,
        "Reserve calls by outcome (reserved, insufficient_stock, or an error class)"
    );
    describe_counter!(
        RELEASES_TOTAL,
        "Release calls by outcome (released, or an error class)"
    );
    describe_counter!(
        STOCK_CONFLICTS_TOTAL,
        "Stock writes rejected because the product row changed since it was read"
    );
    describe_counter!(
        ORDER_EVENTS_TOTAL,
        "Order events consumed, by event type and outcome (processed, ignored, malformed)"
    );
    describe_counter!(
        stockroom_web::middleware::HTTP_REQUESTS_TOTAL,
        "HTTP requests by method and status"
    );

    tracing::info!("Inventory metrics registered");
}

/// Install the Prometheus recorder and its scrape endpoint on `address`.
///
/// # Errors
///
/// Returns an error if the address cannot be parsed or the exporter cannot
/// be installed (e.g. a recorder is already set).
pub fn install_prometheus(address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let address: SocketAddr = address.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    tracing::info!(%address, "Prometheus exporter listening");
    Ok(())
}

/// Label value for an engine error.
#[must_use]
pub const fn error_outcome(err: &InventoryError) -> &'static str {
    match err {
        InventoryError::NotFound(_) => "not_found",
        InventoryError::InvalidInput(_) => "invalid_input",
        InventoryError::InsufficientStock { .. } => "insufficient_stock",
        InventoryError::DependencyFailure(_) => "dependency_failure",
        InventoryError::Conflict(_) => "conflict",
        InventoryError::InvariantViolation(_) => "invariant_violation",
        InventoryError::DeadlineExceeded => "deadline_exceeded",
    }
}

pub(crate) fn record_reservation(outcome: &'static str) {
    metrics::counter!(RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_release(outcome: &'static str) {
    metrics::counter!(RELEASES_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_conflict() {
    metrics::counter!(STOCK_CONFLICTS_TOTAL).increment(1);
}

pub(crate) fn record_order_event(event_type: &str, outcome: &'static str) {
    metrics::counter!(
        ORDER_EVENTS_TOTAL,
        "event_type" => event_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
