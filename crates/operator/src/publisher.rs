//! 网关状态上报
//!
//! After every reconcile pass the operator reports each gateway's health
//! and role to an external status sink. Publication is fire-and-forget
//! from the reconciler's point of view.

use crate::error::{OperatorError, OperatorResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Status of one gateway as reported to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStatusReport {
    pub gateway_id: String,
    pub pair_id: String,
    /// `active` or `standby`
    pub role: String,
    /// `HEALTHY` or `UNHEALTHY`
    pub health: String,
    pub health_message: String,
    /// Unix timestamp (seconds)
    pub reported_at: i64,
}

#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, report: &GatewayStatusReport) -> OperatorResult<()>;
}

/// POSTs each report as JSON.
#[derive(Debug, Clone)]
pub struct HttpStatusPublisher {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpStatusPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> OperatorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl StatusPublisher for HttpStatusPublisher {
    async fn publish(&self, report: &GatewayStatusReport) -> OperatorResult<()> {
        debug!(
            "Publishing status of {} to {}",
            report.gateway_id, self.endpoint
        );
        let response = self.client.post(&self.endpoint).json(report).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(OperatorError::Publish(format!(
                "status sink rejected report for {} with {status}: {error_text}",
                report.gateway_id
            )));
        }
        Ok(())
    }
}

/// Logs reports when no sink is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusPublisher;

#[async_trait]
impl StatusPublisher for LogStatusPublisher {
    async fn publish(&self, report: &GatewayStatusReport) -> OperatorResult<()> {
        info!(
            gateway = %report.gateway_id,
            pair = %report.pair_id,
            role = %report.role,
            health = %report.health,
            "{}",
            report.health_message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    fn report() -> GatewayStatusReport {
        GatewayStatusReport {
            gateway_id: "cwag-1".to_string(),
            pair_id: "pair-1".to_string(),
            role: "active".to_string(),
            health: "HEALTHY".to_string(),
            health_message: "gateway is healthy".to_string(),
            reported_at: 1_700_000_000,
        }
    }

    async fn spawn_sink(status: StatusCode) -> (String, Arc<Mutex<Vec<GatewayStatusReport>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/status",
                post(
                    move |State(received): State<Arc<Mutex<Vec<GatewayStatusReport>>>>,
                          Json(report): Json<GatewayStatusReport>| async move {
                        received.lock().await.push(report);
                        status
                    },
                ),
            )
            .with_state(received.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/status"), received)
    }

    #[tokio::test]
    async fn test_http_publisher_posts_json() {
        let (endpoint, received) = spawn_sink(StatusCode::OK).await;
        let publisher = HttpStatusPublisher::new(endpoint, Duration::from_secs(5)).unwrap();

        publisher.publish(&report()).await.unwrap();
        assert_eq!(*received.lock().await, vec![report()]);
    }

    #[tokio::test]
    async fn test_http_publisher_reports_rejection() {
        let (endpoint, _received) = spawn_sink(StatusCode::SERVICE_UNAVAILABLE).await;
        let publisher = HttpStatusPublisher::new(endpoint, Duration::from_secs(5)).unwrap();

        let err = publisher.publish(&report()).await.unwrap_err();
        assert!(matches!(err, OperatorError::Publish(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_log_publisher_never_fails() {
        LogStatusPublisher.publish(&report()).await.unwrap();
    }
}
