//! HA operator configuration
//!
//! Describes the gateway pairs the operator reconciles and how it reaches
//! their health services.

use super::gateway::default_health_port;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Lowest accepted consecutive-error ceiling.
pub const MIN_CONSECUTIVE_ERRORS: u32 = 1;
/// Highest accepted consecutive-error ceiling.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// HA operator 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Kubernetes 命名空间
    ///
    /// When set, bare health service names are expanded to
    /// `<name>.<namespace>.svc.cluster.local`.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Suffix appended to a gateway resource name to form its health service name.
    #[serde(default = "default_health_service_suffix")]
    pub health_service_suffix: String,

    #[serde(default = "default_health_port")]
    pub health_service_port: u16,

    /// Per-call bound for GetHealthStatus / Enable / Disable.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// Requeue delay after a clean pass.
    #[serde(default = "default_requeue_interval")]
    pub requeue_interval_secs: u64,

    /// Requeue delay after a transient RPC error below the ceiling.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Directory holding one persisted status document per cluster.
    #[serde(default = "default_status_dir")]
    pub status_dir: PathBuf,

    /// Command used to force-recreate a gateway's compute resource.
    ///
    /// `{gateway}` is replaced with the gateway resource name.
    #[serde(default = "default_recreate_command")]
    pub recreate_command: Vec<String>,

    /// Optional HTTP endpoint receiving per-gateway status reports.
    #[serde(default)]
    pub publish_endpoint: Option<String>,

    #[serde(default)]
    pub clusters: Vec<HaClusterConfig>,
}

/// 单个 HA 集群（一对网关）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaClusterConfig {
    pub name: String,

    /// Cluster pair identifier used when publishing status.
    pub pair_id: String,

    /// Ordered gateway resource names; the first one is the initial active.
    pub gateway_resources: Vec<String>,

    /// Consecutive active-side RPC errors tolerated before failing over.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

fn default_health_service_suffix() -> String {
    "-health".to_string()
}

fn default_rpc_timeout() -> u64 {
    10
}

fn default_requeue_interval() -> u64 {
    10
}

fn default_retry_interval() -> u64 {
    3
}

fn default_status_dir() -> PathBuf {
    PathBuf::from("/var/lib/wifi-ha")
}

fn default_recreate_command() -> Vec<String> {
    ["kubectl", "delete", "pod", "{gateway}"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_consecutive_errors() -> u32 {
    3
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            health_service_suffix: default_health_service_suffix(),
            health_service_port: default_health_port(),
            rpc_timeout_secs: default_rpc_timeout(),
            requeue_interval_secs: default_requeue_interval(),
            retry_interval_secs: default_retry_interval(),
            status_dir: default_status_dir(),
            recreate_command: default_recreate_command(),
            publish_endpoint: None,
            clusters: Vec::new(),
        }
    }
}

impl OperatorConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.rpc_timeout_secs == 0 {
            errors.push("operator.rpc_timeout_secs must be greater than 0".to_string());
        }
        if self.requeue_interval_secs == 0 {
            errors.push("operator.requeue_interval_secs must be greater than 0".to_string());
        }
        if self.retry_interval_secs == 0 {
            errors.push("operator.retry_interval_secs must be greater than 0".to_string());
        }
        if self.recreate_command.is_empty() {
            errors.push("operator.recreate_command cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.publish_endpoint
            && !endpoint.starts_with("http://")
            && !endpoint.starts_with("https://")
        {
            errors.push(format!(
                "operator.publish_endpoint '{endpoint}' must start with http:// or https://"
            ));
        }

        let mut names = HashSet::new();
        for cluster in &self.clusters {
            if !names.insert(cluster.name.as_str()) {
                errors.push(format!("Duplicate HA cluster name '{}'", cluster.name));
            }
            errors.extend(cluster.validate());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl HaClusterConfig {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("HA cluster name cannot be empty".to_string());
        }
        if self.gateway_resources.is_empty() || self.gateway_resources.len() > 2 {
            errors.push(format!(
                "HA cluster '{}' must list 1 or 2 gateway resources, got {}",
                self.name,
                self.gateway_resources.len()
            ));
        }
        if self.gateway_resources.len() == 2 && self.gateway_resources[0] == self.gateway_resources[1]
        {
            errors.push(format!(
                "HA cluster '{}' lists gateway '{}' twice",
                self.name, self.gateway_resources[0]
            ));
        }
        if !(MIN_CONSECUTIVE_ERRORS..=MAX_CONSECUTIVE_ERRORS).contains(&self.max_consecutive_errors)
        {
            errors.push(format!(
                "HA cluster '{}' max_consecutive_errors must be within {}..={}, got {}",
                self.name, MIN_CONSECUTIVE_ERRORS, MAX_CONSECUTIVE_ERRORS, self.max_consecutive_errors
            ));
        }

        errors
    }
}
