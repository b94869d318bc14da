//! Prometheus 监控指标模块
//!
//! 提供全局指标收集和导出功能

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::Once;

static METRICS_INIT: Once = Once::new();

lazy_static! {
    /// 全局 Prometheus Registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ========== 网关侧指标 ==========

    /// GRE 对端可达性（1 可达 / 0 不可达）
    pub static ref GRE_PEER_REACHABLE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gre_peer_reachable", "Reachability of a GRE tunnel endpoint (1 = reachable)")
            .namespace("ha"),
        &["peer"]
    ).unwrap();

    /// 主备切换动作结果
    pub static ref ROLE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("role_transitions_total", "Gateway promotion / demotion attempts by outcome")
            .namespace("ha"),
        &["action", "outcome"]
    ).unwrap();

    // ========== Operator 侧指标 ==========

    /// 健康检查 RPC 失败次数
    pub static ref RECONCILE_RPC_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_rpc_errors_total", "Failed health RPCs issued by the reconciler")
            .namespace("ha"),
        &["cluster", "role"]
    ).unwrap();

    /// 故障切换次数
    pub static ref FAILOVERS: IntCounterVec = IntCounterVec::new(
        Opts::new("failovers_total", "Active/standby role swaps")
            .namespace("ha"),
        &["cluster"]
    ).unwrap();

    /// 强制重建网关次数
    pub static ref GATEWAY_RECREATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("gateway_recreations_total", "Forced gateway recreations after a failed demotion")
            .namespace("ha"),
        &["cluster"]
    ).unwrap();
}

/// 注册所有指标到全局 Registry
///
/// This function is idempotent - calling it multiple times is safe.
/// Only the first call will actually register the metrics.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let mut result = Ok(());

    METRICS_INIT.call_once(|| {
        let register_result = (|| {
            REGISTRY.register(Box::new(GRE_PEER_REACHABLE.clone()))?;
            REGISTRY.register(Box::new(ROLE_TRANSITIONS.clone()))?;

            REGISTRY.register(Box::new(RECONCILE_RPC_ERRORS.clone()))?;
            REGISTRY.register(Box::new(FAILOVERS.clone()))?;
            REGISTRY.register(Box::new(GATEWAY_RECREATIONS.clone()))?;

            Ok::<(), prometheus::Error>(())
        })();

        if let Err(e) = register_result {
            result = Err(e);
        }
    });

    result
}

/// Record the reachability of one GRE peer.
pub fn set_gre_peer_reachable(peer: &str, reachable: bool) {
    GRE_PEER_REACHABLE
        .with_label_values(&[peer])
        .set(i64::from(reachable));
}

/// Drop the series of a peer that is no longer probed.
pub fn clear_gre_peer(peer: &str) {
    let _ = GRE_PEER_REACHABLE.remove_label_values(&[peer]);
}

/// 导出 Prometheus 格式的指标
pub fn export_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
