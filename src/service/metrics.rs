use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, routing::get};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    ha_common::metrics::export_metrics()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves `/metrics` until shutdown.
pub struct MetricsHttpService {
    bind_addr: String,
}

impl MetricsHttpService {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
        }
    }

    pub async fn start(&self, shutdown_tx: broadcast::Sender<()>) -> Result<JoinHandle<()>> {
        let addr: SocketAddr = self
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid metrics bind address '{}'", self.bind_addr))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics endpoint to {addr}"))?;
        info!("📈 Prometheus metrics available at http://{}/metrics", addr);

        let mut shutdown_rx = shutdown_tx.subscribe();
        Ok(tokio::spawn(async move {
            let server = axum::serve(listener, router()).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Metrics HTTP server received shutdown signal");
            });
            if let Err(e) = server.await {
                error!("Metrics HTTP server error: {}", e);
                let _ = shutdown_tx.send(());
            }
        }))
    }
}
