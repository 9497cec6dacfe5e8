//! Stockroom inventory server.
//!
//! This binary:
//! - Connects to `PostgreSQL` (and applies migrations), Redis and `RedPanda`
//! - Serves the stock HTTP API
//! - Consumes order events
//! - Exposes Prometheus metrics
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run server
//! cargo run --bin server
//! ```

use stockroom_inventory::{Config, ResourceManager, build_application, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stockroom_inventory=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Stockroom inventory server...");

    // Load configuration
    let config = Config::from_env();
    tracing::info!(
        http = %config.http_address(),
        redpanda = %config.redpanda.brokers,
        topic = %config.redpanda.order_topic,
        "Configuration loaded"
    );

    // Metrics
    metrics::install_prometheus(&config.metrics_address())?;
    metrics::register_inventory_metrics();
    tracing::info!(address = %config.metrics_address(), "Prometheus exporter listening");

    // Infrastructure
    let resources = ResourceManager::from_config(&config).await?;
    let app = build_application(resources).await?;

    tracing::info!("Press Ctrl+C to shutdown");
    app.run().await?;

    Ok(())
}
