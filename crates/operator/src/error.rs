//! HA operator 错误定义

use thiserror::Error;

/// HA operator 错误类型
#[derive(Error, Debug)]
pub enum OperatorError {
    /// 网关返回的 gRPC 状态错误
    #[error("gRPC status error: {0}")]
    Status(#[from] tonic::Status),

    /// RPC 超时
    #[error("{op} on gateway {gateway} timed out")]
    Timeout { op: &'static str, gateway: String },

    /// 无法构造的服务地址
    #[error("Invalid health service address: {0}")]
    InvalidAddress(String),

    /// 集群状态读写错误
    #[error("Status store error: {0}")]
    Store(String),

    /// 强制重建网关失败
    #[error("Gateway recreation failed: {0}")]
    Recreate(String),

    /// 状态上报失败
    #[error("Status publication failed: {0}")]
    Publish(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP 客户端错误
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// HA operator 结果类型别名
pub type OperatorResult<T> = Result<T, OperatorError>;
