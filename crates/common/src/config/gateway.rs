//! 网关健康检查配置
//!
//! Per-gateway settings consumed by the health actuator. Immutable after the
//! process starts.

use crate::error::ConfigError;
use crate::types::IpCidr;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// 网关健康检查配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayHealthConfig {
    /// CPU 利用率阈值（0-1 之间的比例）
    ///
    /// The system verdict turns unhealthy when instantaneous CPU
    /// utilization exceeds this fraction. Default: 0.75
    #[serde(default = "default_util_threshold")]
    pub cpu_util_threshold_pct: f64,

    /// 内存利用率阈值（0-1 之间的比例）
    #[serde(default = "default_util_threshold")]
    pub mem_util_threshold_pct: f64,

    /// GRE 对端探测间隔（秒）
    #[serde(default = "default_gre_probe_interval")]
    pub gre_probe_interval_secs: u64,

    /// 每轮探测发送的 ICMP 包数量
    #[serde(default = "default_icmp_packet_count")]
    pub icmp_packet_count: u32,

    /// 单个 ICMP 探测超时（秒）
    #[serde(default = "default_icmp_probe_timeout")]
    pub icmp_probe_timeout_secs: u64,

    /// 集群虚拟 IP（CIDR 格式）
    ///
    /// Kept as the raw string so a missing section still loads; a malformed
    /// value is rejected by [`GatewayHealthConfig::validate`] and the
    /// gateway refuses to start.
    #[serde(default = "default_cluster_virtual_ip")]
    pub cluster_virtual_ip: String,

    /// 承载 VIP 的业务网卡
    #[serde(default = "default_traffic_interface")]
    pub traffic_interface: String,

    /// GRE 对端地址
    ///
    /// Only single-host entries are monitorable. Entries whose mask covers
    /// more than one host are dropped while loading.
    #[serde(default, deserialize_with = "deserialize_gre_peers")]
    pub gre_peers: Vec<IpAddr>,

    /// 升为主时需要重启的服务（清理备机期间建立的会话状态）
    #[serde(default = "default_enable_restart_services")]
    pub enable_restart_services: Vec<String>,

    /// 降为备时需要重启的服务
    #[serde(default = "default_disable_restart_services")]
    pub disable_restart_services: Vec<String>,

    /// Health gRPC 服务监听配置
    #[serde(default)]
    pub server: HealthServerConfig,
}

/// Health gRPC 服务监听配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthServerConfig {
    #[serde(default = "default_bind_ip")]
    pub ip: String,

    #[serde(default = "default_health_port")]
    pub port: u16,
}

fn default_util_threshold() -> f64 {
    0.75
}

fn default_gre_probe_interval() -> u64 {
    10
}

fn default_icmp_packet_count() -> u32 {
    3
}

fn default_icmp_probe_timeout() -> u64 {
    5
}

fn default_cluster_virtual_ip() -> String {
    "192.168.128.200/24".to_string()
}

fn default_traffic_interface() -> String {
    "eth1".to_string()
}

fn default_enable_restart_services() -> Vec<String> {
    vec!["sessiond".to_string(), "radius".to_string()]
}

fn default_disable_restart_services() -> Vec<String> {
    vec!["aaa_server".to_string()]
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_health_port() -> u16 {
    9107
}

fn deserialize_gre_peers<'de, D>(deserializer: D) -> Result<Vec<IpAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(filter_gre_peers(&raw))
}

/// Keep only single-host peers; anything else is logged and dropped.
pub fn filter_gre_peers(raw: &[String]) -> Vec<IpAddr> {
    let mut peers = Vec::with_capacity(raw.len());
    for entry in raw {
        match entry.parse::<IpCidr>() {
            Ok(cidr) if cidr.is_single_host() => {
                if !peers.contains(&cidr.addr()) {
                    peers.push(cidr.addr());
                }
            }
            Ok(cidr) => {
                warn!(
                    "Dropping GRE peer {}: only single-IP endpoints can be monitored",
                    cidr
                );
            }
            Err(e) => {
                warn!("Dropping malformed GRE peer '{}': {}", entry, e);
            }
        }
    }
    peers
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            ip: default_bind_ip(),
            port: default_health_port(),
        }
    }
}

impl HealthServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl Default for GatewayHealthConfig {
    fn default() -> Self {
        Self {
            cpu_util_threshold_pct: default_util_threshold(),
            mem_util_threshold_pct: default_util_threshold(),
            gre_probe_interval_secs: default_gre_probe_interval(),
            icmp_packet_count: default_icmp_packet_count(),
            icmp_probe_timeout_secs: default_icmp_probe_timeout(),
            cluster_virtual_ip: default_cluster_virtual_ip(),
            traffic_interface: default_traffic_interface(),
            gre_peers: Vec::new(),
            enable_restart_services: default_enable_restart_services(),
            disable_restart_services: default_disable_restart_services(),
            server: HealthServerConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct GatewaySection {
    gateway: Option<GatewayHealthConfig>,
}

impl GatewayHealthConfig {
    /// Load the `[gateway]` section from a TOML file.
    ///
    /// Falls back to the documented defaults when the file is missing,
    /// unreadable, unparseable, or has no `[gateway]` section.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Failed to read gateway health config {:?}: {}; using defaults",
                    path, e
                );
                return Self::default();
            }
        };

        match toml::from_str::<GatewaySection>(&content) {
            Ok(GatewaySection {
                gateway: Some(config),
            }) => config,
            Ok(GatewaySection { gateway: None }) => {
                warn!(
                    "No [gateway] section in {:?}; using default gateway health config",
                    path
                );
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Failed to parse gateway health config {:?}: {}; using defaults",
                    path, e
                );
                Self::default()
            }
        }
    }

    /// Parsed cluster VIP.
    pub fn virtual_ip(&self) -> Result<IpCidr, ConfigError> {
        self.cluster_virtual_ip.parse().map_err(|e| {
            ConfigError::invalid_value(
                "gateway.cluster_virtual_ip",
                format!("'{}': {e}", self.cluster_virtual_ip),
            )
        })
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.gre_probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.icmp_probe_timeout_secs)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.virtual_ip() {
            errors.push(e.to_string());
        }

        for (field, value) in [
            ("cpu_util_threshold_pct", self.cpu_util_threshold_pct),
            ("mem_util_threshold_pct", self.mem_util_threshold_pct),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                errors.push(format!(
                    "gateway.{field} must be a fraction within (0, 1], got {value}"
                ));
            }
        }

        if self.gre_probe_interval_secs == 0 {
            errors.push("gateway.gre_probe_interval_secs must be greater than 0".to_string());
        }
        if self.icmp_packet_count == 0 {
            errors.push("gateway.icmp_packet_count must be greater than 0".to_string());
        }
        if self.icmp_probe_timeout_secs == 0 {
            errors.push("gateway.icmp_probe_timeout_secs must be greater than 0".to_string());
        }
        if self.traffic_interface.trim().is_empty() {
            errors.push("gateway.traffic_interface cannot be empty".to_string());
        }
        if self.server.bind_addr().parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "gateway.server bind address '{}' is invalid",
                self.server.bind_addr()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayHealthConfig::default();
        assert_eq!(config.cpu_util_threshold_pct, 0.75);
        assert_eq!(config.gre_probe_interval_secs, 10);
        assert_eq!(config.icmp_packet_count, 3);
        assert_eq!(config.icmp_probe_timeout_secs, 5);
        assert_eq!(config.server.port, 9107);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_multi_host_gre_peers_are_dropped() {
        let config: GatewayHealthConfig = toml::from_str(
            r#"
            cluster_virtual_ip = "10.10.10.5/24"
            gre_peers = ["192.168.40.2", "192.168.41.0/24", "192.168.42.7/32", "junk"]
            "#,
        )
        .unwrap();

        let expected: Vec<IpAddr> = vec![
            "192.168.40.2".parse().unwrap(),
            "192.168.42.7".parse().unwrap(),
        ];
        assert_eq!(config.gre_peers, expected);
    }

    #[test]
    fn test_malformed_vip_fails_validation() {
        let config = GatewayHealthConfig {
            cluster_virtual_ip: "10.10.10/24".to_string(),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("cluster_virtual_ip")));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = GatewayHealthConfig {
            cpu_util_threshold_pct: 75.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = GatewayHealthConfig::load_or_default("/nonexistent/wifi-ha.toml");
        assert_eq!(config, GatewayHealthConfig::default());
    }

    #[test]
    fn test_load_or_default_reads_gateway_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            name = "cwag-1"

            [gateway]
            cpu_util_threshold_pct = 0.9
            cluster_virtual_ip = "10.0.0.10/16"
            gre_peers = ["10.0.1.1"]
            "#
        )
        .unwrap();

        let config = GatewayHealthConfig::load_or_default(file.path());
        assert_eq!(config.cpu_util_threshold_pct, 0.9);
        assert_eq!(config.virtual_ip().unwrap().prefix_len(), 16);
        assert_eq!(config.gre_peers.len(), 1);
        assert_eq!(config.mem_util_threshold_pct, 0.75);
    }

    #[test]
    fn test_load_or_default_unparseable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway\ncpu = ").unwrap();
        let config = GatewayHealthConfig::load_or_default(file.path());
        assert_eq!(config, GatewayHealthConfig::default());
    }
}
