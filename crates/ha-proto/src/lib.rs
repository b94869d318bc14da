//! Gateway health protocol buffer definitions
//!
//! # Modules
//!
//! - [`gateway_health::v1`]: the `Health` service exposed by every gateway
//!   and consumed by the HA operator.
//!
//! # Usage
//!
//! ```ignore
//! use ha_proto::{HealthClient, HealthStatus, HealthState, Void};
//! ```

/// Gateway health service definitions.
pub mod gateway_health {
    pub mod v1 {
        tonic::include_proto!("gateway_health.v1");
    }
}

// ============================================================================
// Re-exports: messages
// ============================================================================

pub use gateway_health::v1::{DisableMessage, HealthState, HealthStatus, Void};

// ============================================================================
// Re-exports: client and server
// ============================================================================

pub use gateway_health::v1::{
    health_client::HealthClient,
    health_server::{Health, HealthServer},
};

impl HealthStatus {
    /// Build a healthy status with the given message.
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            health: HealthState::Healthy as i32,
            health_message: message.into(),
        }
    }

    /// Build an unhealthy status with the given message.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            health: HealthState::Unhealthy as i32,
            health_message: message.into(),
        }
    }

    /// True when the verdict is `HEALTHY`.
    ///
    /// Unknown enum values decode as unhealthy.
    pub fn is_healthy(&self) -> bool {
        matches!(HealthState::try_from(self.health), Ok(HealthState::Healthy))
    }
}
