//! 审计事件
//!
//! Promotion and demotion outcomes are reported to an [`EventSink`].
//! Emission never blocks or fails the operation that produced the event.

use strum::{AsRefStr, Display};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum GatewayEvent {
    GatewayPromotionSucceeded,
    GatewayPromotionFailed,
    GatewayDemotionSucceeded,
    GatewayDemotionFailed,
}

pub trait EventSink: Send + Sync {
    /// Hand off an event. Must return immediately.
    fn emit(&self, event: GatewayEvent, detail: String);
}

/// Writes events to the `audit` tracing target from a background task.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: GatewayEvent, detail: String) {
        tokio::spawn(async move {
            info!(target: "audit", event = %event, "{}", detail);
        });
    }
}
