//! HA 集群巡检与故障切换
//!
//! One [`ClusterReconciler::reconcile`] call performs a single pass over one
//! cluster: read status, poll both gateways, decide on failover, apply roles
//! (standby first), persist, publish. The caller guarantees at most one pass
//! per cluster at a time.

use crate::client::{GatewayHealthClient, HealthRpcClient};
use crate::error::{OperatorError, OperatorResult};
use crate::publisher::{GatewayStatusReport, HttpStatusPublisher, LogStatusPublisher, StatusPublisher};
use crate::recreator::{CommandRecreator, GatewayRecreator};
use crate::registry::ConnectionRegistry;
use crate::status::{HaClusterStatus, InitState};
use crate::store::{ClusterStatusStore, FileStatusStore};
use chrono::Utc;
use ha_common::metrics::{FAILOVERS, GATEWAY_RECREATIONS, RECONCILE_RPC_ERRORS};
use ha_common::{HaClusterConfig, OperatorConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Demotion period sent with Disable; zero means until the next Enable.
const DISABLE_PERIOD: Duration = Duration::ZERO;

/// Latest observation of one gateway's health.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Observation {
    healthy: bool,
    message: String,
}

impl Observation {
    fn failed(err: &OperatorError) -> Self {
        Self {
            healthy: false,
            message: format!("health check failed: {err}"),
        }
    }
}

pub struct ClusterReconciler {
    client: Arc<dyn GatewayHealthClient>,
    store: Arc<dyn ClusterStatusStore>,
    recreator: Arc<dyn GatewayRecreator>,
    publisher: Arc<dyn StatusPublisher>,
    requeue_interval: Duration,
    retry_interval: Duration,
}

impl ClusterReconciler {
    pub fn new(
        client: Arc<dyn GatewayHealthClient>,
        store: Arc<dyn ClusterStatusStore>,
        recreator: Arc<dyn GatewayRecreator>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        let defaults = OperatorConfig::default();
        Self {
            client,
            store,
            recreator,
            publisher,
            requeue_interval: defaults.requeue_interval(),
            retry_interval: defaults.retry_interval(),
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &OperatorConfig) -> OperatorResult<Self> {
        let registry = Arc::new(ConnectionRegistry::new(config));
        let client = Arc::new(HealthRpcClient::new(registry, config.rpc_timeout()));
        let store = Arc::new(FileStatusStore::new(config.status_dir.clone()));
        let recreator = Arc::new(CommandRecreator::new(config.recreate_command.clone())?);
        let publisher: Arc<dyn StatusPublisher> = match &config.publish_endpoint {
            Some(endpoint) => Arc::new(HttpStatusPublisher::new(
                endpoint.clone(),
                config.rpc_timeout(),
            )?),
            None => Arc::new(LogStatusPublisher),
        };

        Ok(Self::new(client, store, recreator, publisher)
            .with_intervals(config.requeue_interval(), config.retry_interval()))
    }

    pub fn with_intervals(mut self, requeue_interval: Duration, retry_interval: Duration) -> Self {
        self.requeue_interval = requeue_interval;
        self.retry_interval = retry_interval;
        self
    }

    /// Run one pass over `cluster` and return the delay before the next one.
    pub async fn reconcile(&self, cluster: &HaClusterConfig) -> OperatorResult<Duration> {
        let original = self.store.load(&cluster.name).await?;
        let mut status = original.clone();
        let gateways = &cluster.gateway_resources;

        let Some(first) = gateways.first() else {
            warn!(cluster = %cluster.name, "HA cluster has no gateway resources");
            return Ok(self.requeue_interval);
        };

        let active = match status.active.clone() {
            Some(active) if gateways.contains(&active) => active,
            previous => {
                if let Some(previous) = previous {
                    warn!(
                        cluster = %cluster.name,
                        "Active gateway {} is no longer configured, reseeding", previous
                    );
                }
                info!(cluster = %cluster.name, "Seeding active gateway {}", first);
                status = HaClusterStatus::seeded(first.clone());
                self.persist_if_changed(&cluster.name, &original, &status)
                    .await?;
                return Ok(self.requeue_interval);
            }
        };

        let Some(standby) = gateways.iter().find(|g| **g != active).cloned() else {
            debug!(cluster = %cluster.name, "Single gateway cluster, nothing to fail over to");
            return Ok(self.requeue_interval);
        };

        let ceiling = cluster.max_consecutive_errors;

        let active_health = match self.client.health_status(&active).await {
            Ok(health) => {
                status.consecutive_active_errors = 0;
                Observation {
                    healthy: health.is_healthy(),
                    message: health.health_message,
                }
            }
            Err(e) => {
                RECONCILE_RPC_ERRORS
                    .with_label_values(&[cluster.name.as_str(), "active"])
                    .inc();
                status.consecutive_active_errors =
                    status.consecutive_active_errors.saturating_add(1).min(ceiling);

                if status.consecutive_active_errors < ceiling {
                    warn!(
                        cluster = %cluster.name,
                        "Health check of active gateway {} failed ({}/{}): {}",
                        active, status.consecutive_active_errors, ceiling, e
                    );
                    self.persist_if_changed(&cluster.name, &original, &status)
                        .await?;
                    return Ok(self.retry_interval);
                }

                warn!(
                    cluster = %cluster.name,
                    "Active gateway {} unreachable for {} consecutive checks: {}",
                    active, status.consecutive_active_errors, e
                );
                Observation::failed(&e)
            }
        };

        let standby_health = match self.client.health_status(&standby).await {
            Ok(health) => {
                status.consecutive_standby_errors = 0;
                Observation {
                    healthy: health.is_healthy(),
                    message: health.health_message,
                }
            }
            Err(e) => {
                RECONCILE_RPC_ERRORS
                    .with_label_values(&[cluster.name.as_str(), "standby"])
                    .inc();
                status.consecutive_standby_errors =
                    status.consecutive_standby_errors.saturating_add(1).min(ceiling);
                warn!(
                    cluster = %cluster.name,
                    "Health check of standby gateway {} failed: {}", standby, e
                );
                Observation::failed(&e)
            }
        };

        let (active, standby, failover_from) = if active_health.healthy {
            debug!(cluster = %cluster.name, "Active gateway {} is healthy", active);
            (active, standby, None)
        } else if standby_health.healthy {
            info!(
                cluster = %cluster.name,
                "Failing over from {} to {}: {}", active, standby, active_health.message
            );
            FAILOVERS.with_label_values(&[cluster.name.as_str()]).inc();
            status.active = Some(standby.clone());
            status.reset_init_states();
            status.reset_error_counts();
            (standby, active.clone(), Some(active))
        } else {
            warn!(
                cluster = %cluster.name,
                "Both gateways unhealthy, re-initializing roles (active {}: {}; standby {}: {})",
                active, active_health.message, standby, standby_health.message
            );
            status.reset_init_states();
            (active, standby, None)
        };

        let initialized = self
            .initialize_roles(cluster, &mut status, &active, &standby, failover_from.as_deref())
            .await;

        self.persist_if_changed(&cluster.name, &original, &status)
            .await?;

        let (active_observation, standby_observation) = if failover_from.is_some() {
            (standby_health, active_health)
        } else {
            (active_health, standby_health)
        };
        self.publish(
            cluster,
            [
                (active.as_str(), "active", active_observation),
                (standby.as_str(), "standby", standby_observation),
            ],
        );

        Ok(if initialized {
            self.requeue_interval
        } else {
            self.retry_interval
        })
    }

    /// Apply roles that are not yet initialized, standby first so two
    /// gateways never both hold the VIP. Returns false if any RPC failed.
    async fn initialize_roles(
        &self,
        cluster: &HaClusterConfig,
        status: &mut HaClusterStatus,
        active: &str,
        standby: &str,
        failover_from: Option<&str>,
    ) -> bool {
        let mut ok = true;

        if status.standby_init_state != InitState::Initialized {
            match self.client.disable(standby, DISABLE_PERIOD).await {
                Ok(()) => {
                    info!(cluster = %cluster.name, "Gateway {} initialized as standby", standby);
                    status.standby_init_state = InitState::Initialized;
                }
                Err(e) => {
                    ok = false;
                    warn!(
                        cluster = %cluster.name,
                        "Failed to demote gateway {}: {}", standby, e
                    );
                    if failover_from == Some(standby) {
                        self.force_recreate(cluster, standby).await;
                    }
                }
            }
        }

        if status.active_init_state != InitState::Initialized {
            match self.client.enable(active).await {
                Ok(()) => {
                    info!(cluster = %cluster.name, "Gateway {} initialized as active", active);
                    status.active_init_state = InitState::Initialized;
                }
                Err(e) => {
                    ok = false;
                    warn!(
                        cluster = %cluster.name,
                        "Failed to promote gateway {}: {}", active, e
                    );
                }
            }
        }

        ok
    }

    async fn force_recreate(&self, cluster: &HaClusterConfig, gateway: &str) {
        warn!(
            cluster = %cluster.name,
            "Recreating gateway {} to release its VIP after a failed demotion", gateway
        );
        GATEWAY_RECREATIONS
            .with_label_values(&[cluster.name.as_str()])
            .inc();
        if let Err(e) = self.recreator.recreate(gateway).await {
            error!(cluster = %cluster.name, "Failed to recreate gateway {}: {}", gateway, e);
        }
    }

    async fn persist_if_changed(
        &self,
        cluster: &str,
        original: &HaClusterStatus,
        status: &HaClusterStatus,
    ) -> OperatorResult<()> {
        if status == original {
            return Ok(());
        }
        self.store.save(cluster, status).await
    }

    fn publish(&self, cluster: &HaClusterConfig, gateways: [(&str, &str, Observation); 2]) {
        let reported_at = Utc::now().timestamp();
        let reports: Vec<GatewayStatusReport> = gateways
            .into_iter()
            .map(|(gateway, role, observation)| GatewayStatusReport {
                gateway_id: gateway.to_string(),
                pair_id: cluster.pair_id.clone(),
                role: role.to_string(),
                health: if observation.healthy {
                    "HEALTHY".to_string()
                } else {
                    "UNHEALTHY".to_string()
                },
                health_message: observation.message,
                reported_at,
            })
            .collect();

        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            for report in &reports {
                if let Err(e) = publisher.publish(report).await {
                    warn!("Failed to publish status of {}: {}", report.gateway_id, e);
                }
            }
        });
    }
}
