//! 服务管理模块
//!
//! 两类长驻服务：
//!
//! - `HealthGrpcService`: 网关侧，对外提供 `Health` gRPC 服务并运行 GRE 探测
//! - `ReconcileDriver`: 集群侧，为每个 HA 集群运行一个串行巡检循环
//! - `MetricsHttpService`: 可选的 Prometheus `/metrics` 端点
//!
//! 三者都订阅同一个广播关闭通道，收到信号后各自退出。

pub mod gateway;
pub mod metrics;
pub mod operator;

pub use gateway::HealthGrpcService;
pub use metrics::MetricsHttpService;
pub use operator::ReconcileDriver;
