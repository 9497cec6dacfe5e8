//! Application lifecycle management and graceful shutdown.
//!
//! 1. **Startup**: spawn the order-event consumer
//! 2. **Runtime**: serve HTTP and process order events
//! 3. **Shutdown**: coordinate termination of every task
//!
//! # Graceful Shutdown
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. HTTP server stops accepting new connections and drains in-flight requests
//! 2. Shutdown signal broadcast to the consumer
//! 3. Consumer stops reading and drops its dispatcher, closing every lane
//! 4. Lane workers finish queued events
//! 5. Clean exit
//!
//! Each wait is bounded by `SHUTDOWN_TIMEOUT`.

use crate::bootstrap::OrderConsumer;
use crate::config::Config;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Fully wired application, ready to run.
pub struct Application {
    /// TCP listener for HTTP server
    listener: tokio::net::TcpListener,

    /// Axum router with all HTTP routes
    app: axum::Router,

    /// Order-event consumer and its lane workers
    orders: OrderConsumer,

    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,

    /// Application configuration
    config: Arc<Config>,
}

impl Application {
    /// Create a new application instance.
    #[must_use]
    pub fn new(
        listener: tokio::net::TcpListener,
        app: axum::Router,
        orders: OrderConsumer,
        shutdown_tx: broadcast::Sender<()>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            listener,
            app,
            orders,
            shutdown_tx,
            config,
        }
    }

    /// Address the HTTP listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the socket has no local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` completes, then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails. Background tasks are
    /// still shut down in that case.
    pub async fn run_until(self, signal: impl Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
        let Self {
            listener,
            app,
            orders,
            shutdown_tx,
            config,
        } = self;

        info!("Starting order event consumer");
        let consumer = orders.consumer.spawn();

        info!(address = %config.http_address(), "HTTP server listening for requests");
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await;

        if let Err(e) = &served {
            error!(error = %e, "HTTP server failed");
        }
        info!("HTTP server stopped, initiating graceful shutdown...");

        // No receivers left just means the consumer already stopped.
        let _ = shutdown_tx.send(());

        let timeout = Duration::from_secs(config.server.shutdown_timeout);
        await_shutdown(consumer, orders.lane_workers, timeout).await;

        info!("Graceful shutdown complete");
        served
    }
}

async fn await_shutdown(consumer: JoinHandle<()>, lane_workers: Vec<JoinHandle<()>>, timeout: Duration) {
    match tokio::time::timeout(timeout, consumer).await {
        Ok(Ok(())) => info!("Consumer stopped gracefully"),
        Ok(Err(e)) => warn!(error = %e, "Consumer task failed"),
        Err(_) => warn!("Consumer shutdown timed out"),
    }

    for (lane, handle) in lane_workers.into_iter().enumerate() {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(lane, error = %e, "Lane worker failed"),
            Err(_) => warn!(lane, "Lane worker shutdown timed out"),
        }
    }
    info!("Lane workers drained");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bootstrap::{ResourceManager, build_application};
    use stockroom_core::{EventBus, OrderMessage, ProductId};
    use stockroom_testing::{InMemoryCache, InMemoryEventBus, InMemoryLedger, InMemoryProductStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn resources(bus: Arc<InMemoryEventBus>, store: Arc<InMemoryProductStore>) -> ResourceManager {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.shutdown_timeout = 5;
        config.consumer.lanes = 2;
        config.consumer.retry_delay_ms = 10;

        ResourceManager::new(
            config,
            Arc::new(InMemoryCache::new(Duration::from_secs(120))),
            store,
            Arc::new(InMemoryLedger::new()),
            bus,
        )
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_consumes_and_shuts_down() {
        let bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryProductStore::seeded());
        let app = build_application(resources(bus.clone(), store.clone())).await.unwrap();
        let addr = app.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(app.run_until(async move {
            let _ = stop_rx.await;
        }));

        let response = get(addr, "/product/1/stock").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains(r#"{"stock":50}"#), "{response}");

        tokio::time::timeout(Duration::from_secs(5), async {
            while bus.subscriber_count("orders") == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("consumer should subscribe");

        let payload = br#"{"id": 1, "product_requests": [{"product_id": 1, "quantity": 5}]}"#;
        bus.publish("orders", &OrderMessage::new("order.created", payload.to_vec()))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.stock_of(ProductId::new(1)) != Some(45) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("order event should be applied");

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(10), running)
            .await
            .expect("application should stop")
            .unwrap()
            .unwrap();
        assert_eq!(bus.subscriber_count("orders"), 0);
    }
}
