//! HA 集群状态模型

use serde::{Deserialize, Serialize};

/// Whether the reconciler has applied a gateway's intended role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitState {
    #[default]
    Uninitialized,
    Initialized,
}

/// Persisted state of one HA cluster.
///
/// `active` names the active gateway resource; the other configured
/// resource is the standby.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaClusterStatus {
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default)]
    pub active_init_state: InitState,
    #[serde(default)]
    pub standby_init_state: InitState,
    #[serde(default)]
    pub consecutive_active_errors: u32,
    #[serde(default)]
    pub consecutive_standby_errors: u32,
}

impl HaClusterStatus {
    /// Fresh status naming `active`, with both sides uninitialized.
    pub fn seeded(active: impl Into<String>) -> Self {
        Self {
            active: Some(active.into()),
            ..Default::default()
        }
    }

    /// Forget which roles have been applied.
    pub fn reset_init_states(&mut self) {
        self.active_init_state = InitState::Uninitialized;
        self.standby_init_state = InitState::Uninitialized;
    }

    pub fn reset_error_counts(&mut self) {
        self.consecutive_active_errors = 0;
        self.consecutive_standby_errors = 0;
    }

    pub fn is_initialized(&self) -> bool {
        self.active_init_state == InitState::Initialized
            && self.standby_init_state == InitState::Initialized
    }
}
