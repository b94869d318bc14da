//! Error types for gateway-health

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HealthError>;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Service not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("System stats error: {0}")]
    Stats(String),

    /// Several independent failures from one operation, e.g. per-route rewrites.
    #[error("{}", .0.join("; "))]
    Aggregate(Vec<String>),
}

impl HealthError {
    /// Collapse a list of error messages into one error, or nothing when empty.
    pub fn aggregate(errors: Vec<String>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(HealthError::Aggregate(errors))
        }
    }
}

impl From<ha_common::ConfigError> for HealthError {
    fn from(e: ha_common::ConfigError) -> Self {
        HealthError::Config(e.to_string())
    }
}

impl From<HealthError> for tonic::Status {
    fn from(e: HealthError) -> Self {
        match e {
            HealthError::NotFound(_) => tonic::Status::not_found(e.to_string()),
            other => tonic::Status::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_joins_messages() {
        let err = HealthError::aggregate(vec![
            "default: no such device".to_string(),
            "10.0.0.0/24: permission denied".to_string(),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "default: no such device; 10.0.0.0/24: permission denied"
        );
        assert!(HealthError::aggregate(Vec::new()).is_ok());
    }

    #[test]
    fn test_status_mapping() {
        let status: tonic::Status = HealthError::NotFound("sessiond".to_string()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = HealthError::Network("down".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }
}
