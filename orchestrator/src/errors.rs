//! Error types for the beanstalk orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Docker error: {0}")]
    DockerError(#[from] bollard::errors::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid manifest: {}", .0.join("; "))]
    InvalidManifest(Vec<String>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: {0}")]
    TransitionError(String),

    #[error("Deployment queue unavailable: {0}")]
    QueueFull(String),

    #[error("Consistency error: {0}")]
    ConsistencyError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Engine error: {0}")]
    EngineError(String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for PlatformError {
    fn from(err: anyhow::Error) -> Self {
        PlatformError::Internal(err.to_string())
    }
}

impl PlatformError {
    /// Errors raised before dispatch because of bad caller input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlatformError::ValidationError(_) | PlatformError::InvalidManifest(_)
        )
    }
}
