//! Error types for the deployer

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Remote error: {0}")]
    RemoteError(String),

    #[error("Package error: {0}")]
    PackageError(String),

    #[error("Version control error: {0}")]
    VcsError(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for DeployerError {
    fn from(err: tokio::task::JoinError) -> Self {
        DeployerError::Internal(format!("background task failed: {err}"))
    }
}

impl From<walkdir::Error> for DeployerError {
    fn from(err: walkdir::Error) -> Self {
        DeployerError::IoError(err.into())
    }
}
