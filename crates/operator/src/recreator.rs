//! 网关强制重建
//!
//! Last-resort recovery when a superseded active gateway could not be
//! demoted: destroying its compute resource guarantees the VIP is released.

use crate::error::{OperatorError, OperatorResult};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

/// Placeholder replaced with the gateway resource name.
pub const GATEWAY_PLACEHOLDER: &str = "{gateway}";

#[async_trait]
pub trait GatewayRecreator: Send + Sync {
    async fn recreate(&self, gateway: &str) -> OperatorResult<()>;
}

/// Runs a command template such as `kubectl delete pod {gateway}`.
#[derive(Debug, Clone)]
pub struct CommandRecreator {
    template: Vec<String>,
}

impl CommandRecreator {
    pub fn new(template: Vec<String>) -> OperatorResult<Self> {
        if template.is_empty() {
            return Err(OperatorError::Config(
                "recreate command cannot be empty".to_string(),
            ));
        }
        Ok(Self { template })
    }

    fn render(&self, gateway: &str) -> Vec<String> {
        self.template
            .iter()
            .map(|arg| arg.replace(GATEWAY_PLACEHOLDER, gateway))
            .collect()
    }
}

#[async_trait]
impl GatewayRecreator for CommandRecreator {
    async fn recreate(&self, gateway: &str) -> OperatorResult<()> {
        let argv = self.render(gateway);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| OperatorError::Config("recreate command cannot be empty".to_string()))?;

        info!("Recreating gateway {}: {}", gateway, argv.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| OperatorError::Recreate(format!("{}: {e}", argv.join(" "))))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(OperatorError::Recreate(format!(
                "{} exited with {}: {}",
                argv.join(" "),
                output.status,
                stderr.trim()
            )))
        }
    }
}
