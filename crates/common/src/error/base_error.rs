//! 顶层错误枚举

use super::ConfigError;
use thiserror::Error;

/// 顶层错误枚举，聚合 ha-common 的错误
#[derive(Error, Debug)]
pub enum BaseError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 指标注册错误
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// 内部错误（通常表示编程错误）
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BaseError {
    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BaseError>;
