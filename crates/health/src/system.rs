//! 系统资源与 VIP 管理
//!
//! The active gateway owns the cluster VIP on its traffic interface and
//! sources every route on that interface from it. Demotion hands both back
//! to the interface's physical address.

use crate::error::{HealthError, Result};
use crate::network::{InterfaceNetwork, IpCommand, Route};
use crate::stats::{StatsError, SystemStats, collect_system_stats};
use async_trait::async_trait;
use ha_common::{GatewayHealthConfig, IpCidr};
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

type StatsFuture = Pin<Box<dyn Future<Output = std::result::Result<SystemStats, StatsError>> + Send>>;
type StatsProvider = Arc<dyn Fn() -> StatsFuture + Send + Sync>;

#[async_trait]
pub trait SystemResourceProvider: Send + Sync {
    /// Current CPU and memory utilization. On failure the error still
    /// carries whichever readings succeeded.
    async fn system_stats(&self) -> std::result::Result<SystemStats, StatsError>;

    /// Take over the cluster VIP and source all interface routes from it.
    async fn enable(&self) -> Result<()>;

    /// Release the cluster VIP and source all interface routes from the
    /// physical address.
    async fn disable(&self) -> Result<()>;
}

/// [`SystemResourceProvider`] for the local host.
pub struct HostNetworkProvider {
    interface: String,
    vip: IpCidr,
    network: Arc<dyn InterfaceNetwork>,
    stats_provider: StatsProvider,
}

impl HostNetworkProvider {
    /// Fails when the configured VIP is malformed.
    pub fn new(config: &GatewayHealthConfig) -> Result<Self> {
        Ok(Self {
            interface: config.traffic_interface.clone(),
            vip: config.virtual_ip()?,
            network: Arc::new(IpCommand),
            stats_provider: Arc::new(|| Box::pin(collect_system_stats())),
        })
    }

    pub fn with_network(mut self, network: Arc<dyn InterfaceNetwork>) -> Self {
        self.network = network;
        self
    }

    /// Override how system stats are collected.
    pub fn with_stats_provider<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<SystemStats, StatsError>> + Send + 'static,
    {
        self.stats_provider = Arc::new(move || {
            let fut = provider();
            Box::pin(fut)
        });
        self
    }

    /// The VIP as currently assigned, which may carry a different prefix
    /// than configured.
    fn held_vip(&self, addrs: &[IpCidr]) -> Option<IpCidr> {
        addrs.iter().copied().find(|a| a.addr() == self.vip.addr())
    }

    /// Point every same-family route at `src`, skipping routes already using it.
    async fn rewrite_routes(&self, src: IpAddr) -> Result<()> {
        let routes = self.network.routes(&self.interface).await?;
        let pending: Vec<&Route> = routes
            .iter()
            .filter(|r| r.ipv6 == src.is_ipv6() && r.src != Some(src))
            .collect();

        let mut errors = Vec::new();
        for route in pending {
            match self
                .network
                .set_route_source(&self.interface, route, src)
                .await
            {
                Ok(()) => debug!("Route '{}' now sourced from {}", route, src),
                Err(e) => {
                    warn!("Failed to rewrite route '{}': {}", route, e);
                    errors.push(format!("{route}: {e}"));
                }
            }
        }

        HealthError::aggregate(errors)
    }
}

#[async_trait]
impl SystemResourceProvider for HostNetworkProvider {
    async fn system_stats(&self) -> std::result::Result<SystemStats, StatsError> {
        (self.stats_provider)().await
    }

    async fn enable(&self) -> Result<()> {
        let addrs = self.network.addresses(&self.interface).await?;
        if let Some(held) = self.held_vip(&addrs) {
            debug!("VIP {} already on {}", held, self.interface);
        } else {
            self.network.add_address(&self.interface, &self.vip).await?;
            info!("Added VIP {} to {}", self.vip, self.interface);
        }

        let network = self.network.clone();
        let iface = self.interface.clone();
        let vip = self.vip.addr();
        tokio::spawn(async move {
            if let Err(e) = network.announce(&iface, vip).await {
                warn!("Failed to announce VIP {} on {}: {}", vip, iface, e);
            }
        });

        self.rewrite_routes(self.vip.addr()).await
    }

    async fn disable(&self) -> Result<()> {
        let addrs = self.network.addresses(&self.interface).await?;
        if let Some(held) = self.held_vip(&addrs) {
            self.network.remove_address(&self.interface, &held).await?;
            info!("Removed VIP {} from {}", held, self.interface);
        } else {
            debug!("VIP {} not on {}", self.vip, self.interface);
        }

        let remaining = self.network.addresses(&self.interface).await?;
        let physical = remaining
            .iter()
            .map(IpCidr::addr)
            .find(|a| *a != self.vip.addr() && a.is_ipv6() == self.vip.addr().is_ipv6())
            .ok_or_else(|| {
                HealthError::Network(format!(
                    "no physical address left on {} after releasing {}",
                    self.interface, self.vip
                ))
            })?;

        self.rewrite_routes(physical).await
    }
}
