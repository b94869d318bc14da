//! HA 基础设施库
//!
//! Shared building blocks for the gateway health actuator and the cluster
//! HA operator: configuration, the VIP / CIDR type, error types and the
//! Prometheus registry.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{
    GatewayHealthConfig, HaClusterConfig, HaConfig, LogConfig, ObservabilityConfig,
    OperatorConfig, TracingConfig,
};
pub use error::{BaseError, ConfigError, Result};
pub use types::IpCidr;
