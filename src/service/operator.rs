use anyhow::{Context, Result};
use ha_common::{HaClusterConfig, OperatorConfig};
use ha_operator::ClusterReconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Drives one sequential reconcile loop per configured HA cluster.
///
/// A cluster's next pass only starts after the previous one returned, so
/// passes for the same cluster never overlap.
pub struct ReconcileDriver {
    config: OperatorConfig,
    reconciler: Arc<ClusterReconciler>,
}

impl ReconcileDriver {
    pub fn new(config: OperatorConfig) -> Result<Self> {
        let reconciler = ClusterReconciler::from_config(&config)
            .context("Failed to build cluster reconciler")?;
        Ok(Self::with_reconciler(config, reconciler))
    }

    pub fn with_reconciler(config: OperatorConfig, reconciler: ClusterReconciler) -> Self {
        Self {
            config,
            reconciler: Arc::new(reconciler),
        }
    }

    /// Spawn the loops; each one exits on the shutdown broadcast.
    pub fn start(&self, shutdown_tx: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        if self.config.clusters.is_empty() {
            warn!("No HA clusters configured, the operator has nothing to reconcile");
        }

        info!(
            "🚀 Starting HA operator for {} cluster(s), status dir {}",
            self.config.clusters.len(),
            self.config.status_dir.display()
        );

        self.config
            .clusters
            .iter()
            .cloned()
            .map(|cluster| {
                tokio::spawn(reconcile_loop(
                    self.reconciler.clone(),
                    cluster,
                    self.config.retry_interval(),
                    shutdown_tx.subscribe(),
                ))
            })
            .collect()
    }
}

async fn reconcile_loop(
    reconciler: Arc<ClusterReconciler>,
    cluster: HaClusterConfig,
    error_delay: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(
        cluster = %cluster.name,
        "Reconciling gateways {:?}", cluster.gateway_resources
    );

    loop {
        let delay = match reconciler.reconcile(&cluster).await {
            Ok(delay) => delay,
            Err(e) => {
                error!(cluster = %cluster.name, "Reconcile pass failed: {}", e);
                error_delay
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.recv() => {
                info!(cluster = %cluster.name, "Reconcile loop received shutdown signal");
                break;
            }
        }
    }
}
