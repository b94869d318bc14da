//! 网关健康服务连接注册表
//!
//! Maps a gateway resource to the address of its health service and keeps
//! one lazily connected channel per address.

use crate::error::{OperatorError, OperatorResult};
use ha_common::OperatorConfig;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

pub struct ConnectionRegistry {
    namespace: Option<String>,
    service_suffix: String,
    port: u16,
    timeout: Duration,
    /// Explicit gateway -> `host:port` pins, bypassing name derivation.
    pinned: RwLock<HashMap<String, String>>,
    /// Cached channels keyed by `host:port`.
    channels: RwLock<HashMap<String, Channel>>,
}

impl ConnectionRegistry {
    pub fn new(config: &OperatorConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            service_suffix: config.health_service_suffix.clone(),
            port: config.health_service_port,
            timeout: config.rpc_timeout(),
            pinned: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Route a gateway to a fixed `host:port` instead of its derived service name.
    pub async fn pin(&self, gateway: &str, address: impl Into<String>) {
        self.pinned
            .write()
            .await
            .insert(gateway.to_string(), address.into());
    }

    /// Health service host for a gateway resource.
    ///
    /// IP literals and dotted names are used verbatim; bare names are
    /// expanded into the cluster DNS domain when a namespace is configured.
    pub fn service_host(&self, gateway: &str) -> String {
        let name = format!("{}{}", gateway, self.service_suffix);
        match name.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
            Ok(IpAddr::V4(v4)) => v4.to_string(),
            Err(_) if name.contains('.') => name,
            Err(_) => match &self.namespace {
                Some(namespace) => format!("{name}.{namespace}.svc.cluster.local"),
                None => name,
            },
        }
    }

    /// `host:port` of a gateway's health service.
    pub async fn address(&self, gateway: &str) -> String {
        if let Some(address) = self.pinned.read().await.get(gateway) {
            return address.clone();
        }
        format!("{}:{}", self.service_host(gateway), self.port)
    }

    /// Cached channel for a gateway, created on first use.
    pub async fn channel(&self, gateway: &str) -> OperatorResult<Channel> {
        let address = self.address(gateway).await;
        if let Some(channel) = self.channels.read().await.get(&address) {
            return Ok(channel.clone());
        }

        let mut channels = self.channels.write().await;
        if let Some(channel) = channels.get(&address) {
            return Ok(channel.clone());
        }

        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| OperatorError::InvalidAddress(format!("{address}: {e}")))?
            .timeout(self.timeout)
            .connect_timeout(self.timeout);
        let channel = endpoint.connect_lazy();
        debug!("Registered health service connection {} for {}", address, gateway);
        channels.insert(address, channel.clone());
        Ok(channel)
    }

    /// Drop the cached channel of a gateway so the next call reconnects.
    pub async fn remove(&self, gateway: &str) {
        let address = self.address(gateway).await;
        if self.channels.write().await.remove(&address).is_some() {
            debug!("Evicted health service connection {} for {}", address, gateway);
        }
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }
}
