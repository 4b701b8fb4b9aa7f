//! Error types for backup, packaging and upload operations.

use thiserror::Error;

/// Errors raised by the backup pipeline and its components.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Cannot {operation} an upload in state {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Upload aborted: {0}")]
    UploadAborted(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Packaging error: {0}")]
    Packaging(String),
}

impl From<config::ConfigError> for BackupError {
    fn from(err: config::ConfigError) -> Self {
        BackupError::ConfigError(err.to_string())
    }
}

/// Errors reported by an archive service.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Upload session not found: {0}")]
    SessionNotFound(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Service storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Io(_))
    }
}
