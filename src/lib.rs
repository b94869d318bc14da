//! # wifi-ha
//!
//! Carrier-WiFi 网关主备高可用：网关侧健康服务与集群侧 HA operator

pub mod error;
pub mod service;

// Re-export commonly used types
pub use ha_common::config::HaConfig;
pub use service::{HealthGrpcService, MetricsHttpService, ReconcileDriver};
