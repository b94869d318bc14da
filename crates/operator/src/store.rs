//! 集群状态存储
//!
//! 每个 HA 集群对应一份状态文档，只由该集群的 reconciler 写入。

use crate::error::{OperatorError, OperatorResult};
use crate::status::HaClusterStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

/// 集群状态存储抽象接口
#[async_trait]
pub trait ClusterStatusStore: Send + Sync {
    /// 读取集群状态
    ///
    /// # Returns
    /// * `Ok(status)` - 已保存的状态；从未保存过时返回默认（空）状态
    /// * `Err(...)` - 存储错误
    async fn load(&self, cluster: &str) -> OperatorResult<HaClusterStatus>;

    /// 保存集群状态（整体覆盖）
    async fn save(&self, cluster: &str, status: &HaClusterStatus) -> OperatorResult<()>;
}

/// One JSON document per cluster under a directory.
pub struct FileStatusStore {
    dir: PathBuf,
}

impl FileStatusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, cluster: &str) -> OperatorResult<PathBuf> {
        if cluster.is_empty()
            || cluster.contains(['/', '\\'])
            || cluster == "."
            || cluster == ".."
        {
            return Err(OperatorError::Store(format!(
                "invalid cluster name '{cluster}'"
            )));
        }
        Ok(self.dir.join(format!("{cluster}.json")))
    }
}

#[async_trait]
impl ClusterStatusStore for FileStatusStore {
    async fn load(&self, cluster: &str) -> OperatorResult<HaClusterStatus> {
        let path = self.path_for(cluster)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored status for cluster {}", cluster);
                return Ok(HaClusterStatus::default());
            }
            Err(e) => {
                return Err(OperatorError::Store(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        serde_json::from_slice(&content).map_err(|e| {
            OperatorError::Store(format!("failed to parse {}: {e}", path.display()))
        })
    }

    async fn save(&self, cluster: &str, status: &HaClusterStatus) -> OperatorResult<()> {
        let path = self.path_for(cluster)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so readers never see a torn document.
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(status)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Persisted status of cluster {} to {}", cluster, path.display());
        Ok(())
    }
}

/// In-memory store, also records how many writes happened.
#[derive(Default)]
pub struct MemoryStatusStore {
    statuses: RwLock<HashMap<String, HaClusterStatus>>,
    writes: RwLock<usize>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn writes(&self) -> usize {
        *self.writes.read().await
    }
}

#[async_trait]
impl ClusterStatusStore for MemoryStatusStore {
    async fn load(&self, cluster: &str) -> OperatorResult<HaClusterStatus> {
        Ok(self
            .statuses
            .read()
            .await
            .get(cluster)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, cluster: &str, status: &HaClusterStatus) -> OperatorResult<()> {
        self.statuses
            .write()
            .await
            .insert(cluster.to_string(), status.clone());
        *self.writes.write().await += 1;
        Ok(())
    }
}
