//! 网关健康服务 gRPC 客户端

use crate::error::{OperatorError, OperatorResult};
use crate::registry::ConnectionRegistry;
use async_trait::async_trait;
use ha_proto::{DisableMessage, HealthClient, HealthStatus, Void};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tonic::Code;
use tonic::transport::Channel;
use tracing::debug;

/// Health RPCs the reconciler issues against a gateway resource.
#[async_trait]
pub trait GatewayHealthClient: Send + Sync {
    async fn health_status(&self, gateway: &str) -> OperatorResult<HealthStatus>;

    async fn enable(&self, gateway: &str) -> OperatorResult<()>;

    async fn disable(&self, gateway: &str, disable_period: Duration) -> OperatorResult<()>;
}

/// gRPC implementation over the connection registry.
///
/// Every call is bounded by the configured timeout; a timeout is reported
/// like any other RPC failure.
pub struct HealthRpcClient {
    registry: Arc<ConnectionRegistry>,
    timeout: Duration,
}

impl HealthRpcClient {
    pub fn new(registry: Arc<ConnectionRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    async fn call<T, F, Fut>(&self, op: &'static str, gateway: &str, f: F) -> OperatorResult<T>
    where
        F: FnOnce(HealthClient<Channel>) -> Fut,
        Fut: Future<Output = Result<tonic::Response<T>, tonic::Status>>,
    {
        let channel = self.registry.channel(gateway).await?;
        debug!("Calling {} on gateway {}", op, gateway);

        match tokio::time::timeout(self.timeout, f(HealthClient::new(channel))).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => {
                if status.code() == Code::Unavailable {
                    self.registry.remove(gateway).await;
                }
                Err(OperatorError::Status(status))
            }
            Err(_) => Err(OperatorError::Timeout {
                op,
                gateway: gateway.to_string(),
            }),
        }
    }
}

#[async_trait]
impl GatewayHealthClient for HealthRpcClient {
    async fn health_status(&self, gateway: &str) -> OperatorResult<HealthStatus> {
        self.call("GetHealthStatus", gateway, |mut client| async move {
            client.get_health_status(Void {}).await
        })
        .await
    }

    async fn enable(&self, gateway: &str) -> OperatorResult<()> {
        self.call("Enable", gateway, |mut client| async move {
            client.enable(Void {}).await
        })
        .await
        .map(|_| ())
    }

    async fn disable(&self, gateway: &str, disable_period: Duration) -> OperatorResult<()> {
        let request = DisableMessage {
            disable_period_secs: disable_period.as_secs(),
        };
        self.call("Disable", gateway, |mut client| async move {
            client.disable(request).await
        })
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_common::OperatorConfig;

    #[tokio::test]
    async fn test_unreachable_gateway_is_an_error() {
        let config = OperatorConfig {
            rpc_timeout_secs: 1,
            ..Default::default()
        };
        let registry = Arc::new(ConnectionRegistry::new(&config));
        // Nothing listens on the discard port.
        registry.pin("cwag-1", "127.0.0.1:9").await;

        let client = HealthRpcClient::new(registry.clone(), config.rpc_timeout());
        let err = client.health_status("cwag-1").await.unwrap_err();
        assert!(matches!(
            err,
            OperatorError::Status(_) | OperatorError::Timeout { .. }
        ));
    }
}
