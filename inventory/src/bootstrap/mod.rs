//! Bootstrap components for application initialization.
//!
//! - **`resources`**: infrastructure setup (`PostgreSQL`, Redis, `RedPanda`)
//! - **`consumers`**: order-event consumer registration
//!
//! # Example
//!
//! ```rust,ignore
//! // Step 1: Initialize resources
//! let resources = ResourceManager::from_config(&config).await?;
//!
//! // Step 2: Wire engine, consumer and router, bind the listener
//! let app = build_application(resources).await?;
//!
//! // Step 3: Run until Ctrl+C / SIGTERM
//! app.run().await?;
//! ```

pub mod consumers;
pub mod resources;

pub use consumers::{OrderConsumer, register_order_consumer};
pub use resources::{BootstrapError, ResourceManager};

use crate::lifecycle::Application;
use crate::server::{AppState, build_router};
use std::sync::Arc;
use stockroom_web::DeadlinePolicy;
use tokio::sync::broadcast;
use tracing::info;

/// Wire every component over `resources` and bind the HTTP listener.
///
/// The HTTP server and the consumer share one [`ReservationEngine`](crate::service::ReservationEngine).
///
/// # Errors
///
/// Returns [`BootstrapError::Bind`] if the HTTP address cannot be bound.
pub async fn build_application(resources: ResourceManager) -> Result<Application, BootstrapError> {
    let config = Arc::clone(&resources.config);
    let engine = Arc::new(resources.reservation_engine());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let orders = register_order_consumer(&resources, Arc::clone(&engine), shutdown_rx);

    let state = AppState::new(
        engine,
        DeadlinePolicy::new(config.max_request_timeout()),
    );
    let router = build_router(state);

    let address = config.http_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| BootstrapError::Bind {
            address: address.clone(),
            source,
        })?;
    info!(address = %address, "HTTP listener bound");

    Ok(Application::new(listener, router, orders, shutdown_tx, config))
}
