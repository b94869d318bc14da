//! 网关健康执行器
//!
//! Serves the `Health` gRPC service. Health queries combine the GRE
//! reachability, system load and service liveness verdicts; Enable and
//! Disable move the gateway between the active and standby roles.

use crate::error::Result;
use crate::events::{EventSink, GatewayEvent, TracingEventSink};
use crate::probe::{IcmpProbe, NoOpProbe, ReachabilityProbe};
use crate::services::{ContainerRuntimeProvider, ServiceLifecycleProvider};
use crate::system::{HostNetworkProvider, SystemResourceProvider};
use ha_common::GatewayHealthConfig;
use ha_common::metrics::ROLE_TRANSITIONS;
use ha_proto::{DisableMessage, Health, HealthStatus, Void};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

type GrpcResult<T> = std::result::Result<T, Status>;

/// Role last applied successfully by this actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayRole {
    Enabled,
    Disabled,
}

/// Outcome of one health sub-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Unhealthy(String),
}

/// Gateway health actuator.
#[derive(Clone)]
pub struct GatewayHealthActuator {
    config: Arc<GatewayHealthConfig>,
    probe: Arc<dyn ReachabilityProbe>,
    services: Arc<dyn ServiceLifecycleProvider>,
    system: Arc<dyn SystemResourceProvider>,
    events: Arc<dyn EventSink>,
    role: Arc<RwLock<Option<GatewayRole>>>,
}

/// Builder for [`GatewayHealthActuator`]. Unset collaborators get the
/// host implementations derived from the configuration.
pub struct GatewayHealthActuatorBuilder {
    config: GatewayHealthConfig,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    services: Option<Arc<dyn ServiceLifecycleProvider>>,
    system: Option<Arc<dyn SystemResourceProvider>>,
    events: Option<Arc<dyn EventSink>>,
}

impl GatewayHealthActuatorBuilder {
    pub fn probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn services(mut self, services: Arc<dyn ServiceLifecycleProvider>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn system(mut self, system: Arc<dyn SystemResourceProvider>) -> Self {
        self.system = Some(system);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Fails when the host system provider cannot be built (malformed VIP).
    pub fn build(self) -> Result<GatewayHealthActuator> {
        let probe: Arc<dyn ReachabilityProbe> = match self.probe {
            Some(probe) => probe,
            None if self.config.gre_peers.is_empty() => {
                info!("No GRE peers configured, tunnel reachability is not monitored");
                Arc::new(NoOpProbe)
            }
            None => Arc::new(IcmpProbe::from_config(&self.config)),
        };

        let system: Arc<dyn SystemResourceProvider> = match self.system {
            Some(system) => system,
            None => Arc::new(HostNetworkProvider::new(&self.config)?),
        };

        Ok(GatewayHealthActuator {
            probe,
            system,
            services: self
                .services
                .unwrap_or_else(|| Arc::new(ContainerRuntimeProvider::docker())),
            events: self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
            role: Arc::new(RwLock::new(None)),
            config: Arc::new(self.config),
        })
    }
}

fn record_transition(action: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    ROLE_TRANSITIONS
        .with_label_values(&[action, outcome])
        .inc();
}

impl GatewayHealthActuator {
    pub fn builder(config: GatewayHealthConfig) -> GatewayHealthActuatorBuilder {
        GatewayHealthActuatorBuilder {
            config,
            probe: None,
            services: None,
            system: None,
            events: None,
        }
    }

    /// Start background reachability probing.
    pub async fn start(&self) -> Result<()> {
        self.probe.start().await
    }

    /// Stop probing and drop all recorded reachability results.
    pub async fn shutdown(&self) {
        self.probe.stop().await;
    }

    /// Role applied by the last successful Enable or Disable.
    pub async fn role(&self) -> Option<GatewayRole> {
        *self.role.read().await
    }

    /// Promote this gateway to active (backs the Enable RPC).
    ///
    /// A gateway already enabled by this process returns immediately
    /// without re-checking the VIP or services.
    pub async fn promote(&self) -> Result<()> {
        if self.role().await == Some(GatewayRole::Enabled) {
            debug!("Gateway already enabled, skipping promotion");
            self.events.emit(
                GatewayEvent::GatewayPromotionSucceeded,
                "gateway already active".to_string(),
            );
            return Ok(());
        }

        match self.apply_promotion().await {
            Ok(()) => {
                *self.role.write().await = Some(GatewayRole::Enabled);
                record_transition("promote", true);
                info!("Gateway promoted to active");
                self.events.emit(
                    GatewayEvent::GatewayPromotionSucceeded,
                    format!("gateway now owns VIP {}", self.config.cluster_virtual_ip),
                );
                Ok(())
            }
            Err(e) => {
                record_transition("promote", false);
                warn!("Gateway promotion failed: {}", e);
                self.events.emit(
                    GatewayEvent::GatewayPromotionFailed,
                    format!("promotion failed: {e}"),
                );
                Err(e)
            }
        }
    }

    async fn apply_promotion(&self) -> Result<()> {
        self.system.enable().await?;
        for service in &self.config.enable_restart_services {
            self.services.restart(service).await?;
        }
        Ok(())
    }

    /// Demote this gateway to standby (backs the Disable RPC).
    ///
    /// `disable_period` is informational; the gateway stays standby until
    /// the next promotion.
    pub async fn demote(&self, disable_period: Duration) -> Result<()> {
        if self.role().await == Some(GatewayRole::Disabled) {
            debug!("Gateway already disabled, skipping demotion");
            self.events.emit(
                GatewayEvent::GatewayDemotionSucceeded,
                "gateway already standby".to_string(),
            );
            return Ok(());
        }

        info!("Demoting gateway, requested period {:?}", disable_period);
        match self.apply_demotion().await {
            Ok(()) => {
                *self.role.write().await = Some(GatewayRole::Disabled);
                record_transition("demote", true);
                info!("Gateway demoted to standby");
                self.events.emit(
                    GatewayEvent::GatewayDemotionSucceeded,
                    format!("gateway released VIP {}", self.config.cluster_virtual_ip),
                );
                Ok(())
            }
            Err(e) => {
                record_transition("demote", false);
                warn!("Gateway demotion failed: {}", e);
                self.events.emit(
                    GatewayEvent::GatewayDemotionFailed,
                    format!("demotion failed: {e}"),
                );
                Err(e)
            }
        }
    }

    async fn apply_demotion(&self) -> Result<()> {
        self.system.disable().await?;
        for service in &self.config.disable_restart_services {
            self.services.restart(service).await?;
        }
        Ok(())
    }

    /// Unhealthy only when peers were probed and none answered.
    async fn tunnel_verdict(&self) -> Verdict {
        let status = self.probe.status().await;
        if !status.reachable.is_empty() || status.unreachable.is_empty() {
            return Verdict::Healthy;
        }

        let mut peers: Vec<_> = status.unreachable.iter().collect();
        peers.sort();
        let peers: Vec<String> = peers.iter().map(|p| p.to_string()).collect();
        Verdict::Unhealthy(format!("all GRE peers unreachable: {}", peers.join(", ")))
    }

    async fn system_verdict(&self) -> Verdict {
        let stats = match self.system.system_stats().await {
            Ok(stats) => stats,
            Err(e) => return Verdict::Unhealthy(format!("failed to collect system stats: {e}")),
        };

        let cpu_threshold = self.config.cpu_util_threshold_pct;
        let mem_threshold = self.config.mem_util_threshold_pct;
        if stats.cpu_util > cpu_threshold {
            Verdict::Unhealthy(format!(
                "CPU utilization {:.2} exceeds threshold {:.2}",
                stats.cpu_util, cpu_threshold
            ))
        } else if stats.mem_util > mem_threshold {
            Verdict::Unhealthy(format!(
                "memory utilization {:.2} exceeds threshold {:.2}",
                stats.mem_util, mem_threshold
            ))
        } else {
            Verdict::Healthy
        }
    }

    async fn service_verdict(&self) -> Verdict {
        match self.services.unhealthy_services().await {
            Ok(services) if services.is_empty() => Verdict::Healthy,
            Ok(services) => Verdict::Unhealthy(format!("unhealthy services: {}", services.join(", "))),
            Err(e) => Verdict::Unhealthy(format!("failed to list services: {e}")),
        }
    }

    /// Combined health of this gateway.
    pub async fn health_status(&self) -> HealthStatus {
        let (tunnel, system, service) = tokio::join!(
            self.tunnel_verdict(),
            self.system_verdict(),
            self.service_verdict()
        );

        let problems: Vec<String> = [
            ("GRE status", tunnel),
            ("System status", system),
            ("Service status", service),
        ]
        .into_iter()
        .filter_map(|(label, verdict)| match verdict {
            Verdict::Healthy => None,
            Verdict::Unhealthy(message) => Some(format!("{label}: {message}")),
        })
        .collect();

        if problems.is_empty() {
            HealthStatus::healthy("gateway is healthy")
        } else {
            let message = problems.join("; ");
            debug!("Gateway unhealthy: {}", message);
            HealthStatus::unhealthy(message)
        }
    }
}

#[tonic::async_trait]
impl Health for GatewayHealthActuator {
    async fn enable(&self, _request: Request<Void>) -> GrpcResult<Response<Void>> {
        self.promote().await?;
        Ok(Response::new(Void {}))
    }

    async fn disable(&self, request: Request<DisableMessage>) -> GrpcResult<Response<Void>> {
        let period = Duration::from_secs(request.into_inner().disable_period_secs);
        self.demote(period).await?;
        Ok(Response::new(Void {}))
    }

    async fn get_health_status(&self, _request: Request<Void>) -> GrpcResult<Response<HealthStatus>> {
        Ok(Response::new(self.health_status().await))
    }
}
