use anyhow::{Context, Result};
use gateway_health::{GatewayHealthActuator, HealthServer};
use ha_common::GatewayHealthConfig;
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tonic::transport::Server;
use tracing::{error, info};

/// Gateway health gRPC service launcher
#[derive(Debug)]
pub struct HealthGrpcService {
    config: GatewayHealthConfig,
}

impl HealthGrpcService {
    /// `config` must already be validated; the VIP is parsed again here and
    /// a malformed one aborts startup.
    pub fn new(config: GatewayHealthConfig) -> Self {
        Self { config }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let bind_addr = self.config.server.bind_addr();
        bind_addr
            .parse()
            .with_context(|| format!("Failed to parse health service bind address {bind_addr}"))
    }

    /// Build the actuator, start GRE probing and serve `Health` until shutdown.
    ///
    /// The probe is stopped after the server exits, and a server failure
    /// broadcasts shutdown to the rest of the process.
    pub async fn start(&self, shutdown_tx: broadcast::Sender<()>) -> Result<JoinHandle<()>> {
        let addr = self.bind_addr()?;

        let actuator = GatewayHealthActuator::builder(self.config.clone())
            .build()
            .context("Failed to build gateway health actuator")?;
        actuator
            .start()
            .await
            .context("Failed to start GRE reachability probe")?;

        info!(
            "🚀 Starting gateway health gRPC service on {} (VIP {}, interface {}, {} GRE peers)",
            addr,
            self.config.cluster_virtual_ip,
            self.config.traffic_interface,
            self.config.gre_peers.len()
        );

        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let result = Server::builder()
                .add_service(HealthServer::new(actuator.clone()))
                .serve_with_shutdown(addr, async move {
                    info!("✅ Gateway health gRPC service listening on {}", addr);
                    let _ = shutdown_rx.recv().await;
                    info!("Gateway health gRPC service received shutdown signal");
                })
                .await;

            if let Err(err) = result {
                error!("Gateway health gRPC service error: {}", err);
            }

            actuator.shutdown().await;
            let _ = shutdown_tx.send(());
        });

        Ok(handle)
    }
}
