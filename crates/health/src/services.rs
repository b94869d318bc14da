//! 网关服务生命周期管理
//!
//! Gateway services run as containers. The provider maps logical service
//! names (`sessiond`, `radius`) to containers through the runtime and
//! restarts or stops them on request.

use crate::command;
use crate::error::{HealthError, Result};
use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait ServiceLifecycleProvider: Send + Sync {
    /// Names of services whose runtime health check is currently failing.
    async fn unhealthy_services(&self) -> Result<Vec<String>>;

    /// Restart the named service. `NotFound` when no container carries that name.
    async fn restart(&self, service: &str) -> Result<()>;

    /// Stop the named service. `NotFound` when no container carries that name.
    async fn stop(&self, service: &str) -> Result<()>;
}

/// A container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    /// Runtime names; some runtimes prefix them with `/`.
    pub names: Vec<String>,
}

/// 容器运行时抽象
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers including stopped ones. `unhealthy_only` keeps only
    /// those whose health check is failing.
    async fn list_containers(&self, unhealthy_only: bool) -> Result<Vec<ContainerSummary>>;

    async fn restart_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;
}

const DOCKER: &str = "docker";

/// Container runtime driven through the `docker` CLI.
#[derive(Debug, Clone, Default)]
pub struct DockerCli;

/// Parse `docker ps --format '{{.ID}}\t{{.Names}}'` output.
fn parse_ps_output(output: &str) -> Vec<ContainerSummary> {
    output
        .lines()
        .filter_map(|line| {
            let (id, names) = line.trim().split_once('\t')?;
            Some(ContainerSummary {
                id: id.to_string(),
                names: names.split(',').map(|n| n.trim().to_string()).collect(),
            })
        })
        .collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_containers(&self, unhealthy_only: bool) -> Result<Vec<ContainerSummary>> {
        let mut args = vec!["ps", "--all", "--no-trunc", "--format", "{{.ID}}\t{{.Names}}"];
        if unhealthy_only {
            args.extend(["--filter", "health=unhealthy"]);
        }
        let output = command::run(DOCKER, &args).await?;
        Ok(parse_ps_output(&output))
    }

    async fn restart_container(&self, id: &str) -> Result<()> {
        command::run(DOCKER, &["restart", id]).await.map(|_| ())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        command::run(DOCKER, &["stop", id]).await.map(|_| ())
    }
}

/// Strip the leading separator some runtimes put in front of names.
fn service_name(raw: &str) -> &str {
    raw.strip_prefix('/').unwrap_or(raw)
}

/// [`ServiceLifecycleProvider`] over a container runtime.
pub struct ContainerRuntimeProvider<R = DockerCli> {
    runtime: R,
}

impl ContainerRuntimeProvider<DockerCli> {
    pub fn docker() -> Self {
        Self::new(DockerCli)
    }
}

impl<R: ContainerRuntime> ContainerRuntimeProvider<R> {
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    /// Find the container id for an exact service name.
    async fn resolve(&self, service: &str) -> Result<String> {
        let containers = self.runtime.list_containers(false).await?;
        containers
            .into_iter()
            .find(|c| c.names.iter().any(|n| service_name(n) == service))
            .map(|c| c.id)
            .ok_or_else(|| HealthError::NotFound(service.to_string()))
    }
}

#[async_trait]
impl<R: ContainerRuntime> ServiceLifecycleProvider for ContainerRuntimeProvider<R> {
    async fn unhealthy_services(&self) -> Result<Vec<String>> {
        let containers = self.runtime.list_containers(true).await?;
        Ok(containers
            .iter()
            .filter_map(|c| c.names.first())
            .map(|n| service_name(n).to_string())
            .collect())
    }

    async fn restart(&self, service: &str) -> Result<()> {
        let id = self.resolve(service).await?;
        debug!("Restarting service {} (container {})", service, id);
        self.runtime.restart_container(&id).await?;
        info!("Restarted service {}", service);
        Ok(())
    }

    async fn stop(&self, service: &str) -> Result<()> {
        let id = self.resolve(service).await?;
        debug!("Stopping service {} (container {})", service, id);
        self.runtime.stop_container(&id).await?;
        info!("Stopped service {}", service);
        Ok(())
    }
}
