//! HA Operator - 网关主备集群控制器
//!
//! For every configured HA cluster (a pair of gateway resources) the
//! operator periodically:
//!
//! 1. 读取集群持久化状态（当前 active 网关、角色初始化状态、连续错误计数）
//! 2. 通过 gRPC 查询两个网关的健康状态
//! 3. active 不健康且 standby 健康时执行故障切换
//! 4. 先下发 standby 的 Disable，再下发 active 的 Enable
//! 5. 状态有变化时持久化，并上报每个网关的角色与健康状态
//!
//! ```text
//!  ┌──────────────────┐   GetHealthStatus / Enable / Disable   ┌────────────┐
//!  │ ClusterReconciler│ ─────────────────────────────────────▶ │ gateway    │
//!  │                  │         (HealthRpcClient)              │ Health svc │
//!  └──────┬─────┬─────┘                                        └────────────┘
//!         │     │
//!         ▼     ▼
//!  ClusterStatusStore   StatusPublisher / GatewayRecreator
//! ```

pub mod client;
pub mod error;
pub mod publisher;
pub mod reconciler;
pub mod recreator;
pub mod registry;
pub mod status;
pub mod store;

pub use client::{GatewayHealthClient, HealthRpcClient};
pub use error::{OperatorError, OperatorResult};
pub use publisher::{
    GatewayStatusReport, HttpStatusPublisher, LogStatusPublisher, StatusPublisher,
};
pub use reconciler::ClusterReconciler;
pub use recreator::{CommandRecreator, GATEWAY_PLACEHOLDER, GatewayRecreator};
pub use registry::ConnectionRegistry;
pub use status::{HaClusterStatus, InitState};
pub use store::{ClusterStatusStore, FileStatusStore, MemoryStatusStore};
