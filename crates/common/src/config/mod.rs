//! 统一配置管理系统
//!
//! One TOML file configures a process. The `[gateway]` section drives the
//! health actuator, the `[operator]` section drives the cluster reconciler;
//! a deployment normally sets exactly one of them.

pub mod gateway;
pub mod operator;
pub mod tracing;

pub use crate::config::gateway::{GatewayHealthConfig, HealthServerConfig, filter_gre_peers};
pub use crate::config::operator::{HaClusterConfig, OperatorConfig};
pub use crate::config::tracing::TracingConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// HA 服务主配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HaConfig {
    /// 实例名称
    ///
    /// Identifies this process in logs and traces, e.g. `cwag-1` or
    /// `ha-operator`.
    pub name: String,

    /// 可观测性配置（日志 + 追踪）
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Gateway health actuator settings
    #[serde(default)]
    pub gateway: Option<GatewayHealthConfig>,

    /// Cluster HA operator settings
    #[serde(default)]
    pub operator: Option<OperatorConfig>,
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别（用于日志与追踪）
    ///
    /// 支持 EnvFilter 语法（如 "info,h2=warn"）。默认值 "info"。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,

    /// OpenTelemetry 追踪配置（可选）
    ///
    /// 需要编译时启用 `opentelemetry` feature。
    #[serde(default)]
    pub tracing: TracingConfig,

    /// Prometheus `/metrics` 监听地址（如 "0.0.0.0:9108"），不设置则不暴露
    #[serde(default)]
    pub metrics_bind: Option<String>,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// 日志输出目标
    ///
    /// - "console": 仅输出到控制台（默认）
    /// - "file": 输出到文件
    #[serde(default = "default_log_output")]
    pub output: String,

    /// 日志轮转开关
    ///
    /// 当 output = "file" 时有效：true 按天轮转，false 追加到单个文件
    #[serde(default)]
    pub rotate: bool,

    /// 日志文件目录
    #[serde(default = "default_log_path")]
    pub path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            filter_level: default_filter_level(),
            tracing: TracingConfig::default(),
            metrics_bind: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_filter_level() -> String {
    "info".to_string()
}

impl Default for HaConfig {
    fn default() -> Self {
        Self {
            name: "wifi-ha".to_string(),
            observability: ObservabilityConfig::default(),
            gateway: None,
            operator: None,
        }
    }
}

impl HaConfig {
    /// 获取追踪配置
    pub fn tracing_config(&self) -> &TracingConfig {
        &self.observability.tracing
    }

    /// 返回可观测性配置引用
    pub fn observability_config(&self) -> &ObservabilityConfig {
        &self.observability
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path_ref.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path_ref).map_err(|e| ConfigError::ParseError {
            source: Box::new(e),
        })?;

        Self::from_toml(&content)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            source: Box::new(e),
        })
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::InvalidFormat {
            message: e.to_string(),
        })
    }

    /// 验证配置有效性
    ///
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        // 验证过滤级别（EnvFilter 语法）
        let main_level = self
            .observability
            .filter_level
            .split(',')
            .next()
            .unwrap_or("")
            .trim();
        if !["trace", "debug", "info", "warn", "error"].contains(&main_level) {
            errors.push(format!(
                "Invalid filter level '{}', must start with one of: trace, debug, info, warn, error",
                self.observability.filter_level
            ));
        }

        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        if let Some(bind) = &self.observability.metrics_bind
            && bind.parse::<std::net::SocketAddr>().is_err()
        {
            errors.push(format!(
                "Invalid observability.metrics_bind '{bind}', expected ip:port"
            ));
        }

        if let Err(tracing_errors) = self.observability.tracing.validate() {
            errors.extend(
                tracing_errors
                    .into_iter()
                    .map(|e| format!("Tracing configuration error: {e}")),
            );
        }

        if self.gateway.is_none() && self.operator.is_none() {
            errors.push(
                "Warning: neither [gateway] nor [operator] is configured, nothing to run"
                    .to_string(),
            );
        }

        if let Some(gateway) = &self.gateway
            && let Err(gateway_errors) = gateway.validate()
        {
            errors.extend(gateway_errors);
        }

        if let Some(operator) = &self.operator
            && let Err(operator_errors) = operator.validate()
        {
            errors.extend(operator_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
