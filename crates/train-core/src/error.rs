//! Error types for the training harness

use thiserror::Error;

use crate::Epoch;

/// Result type alias using the harness Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the training harness
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Training errors
    #[error("Training step failed at epoch {epoch}: {message}")]
    StepFailed { epoch: Epoch, message: String },

    // Checkpoint errors
    #[error("Checkpoint not found: {checkpoint_id}")]
    CheckpointNotFound { checkpoint_id: String },

    #[error("Checkpoint write failed: {message}")]
    CheckpointWriteFailed { message: String },

    #[error("Checkpoint corrupted: {checkpoint_id} - {reason}")]
    CheckpointCorrupted { checkpoint_id: String, reason: String },

    // Dataset errors
    #[error("Dataset not found: {path}")]
    DatasetNotFound { path: String },

    #[error("Invalid dataset: {message}")]
    InvalidDataset { message: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Shorthand for a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if the run cannot continue or be resumed without operator action
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig { .. }
                | Error::CheckpointCorrupted { .. }
                | Error::InvalidDataset { .. }
                | Error::Internal { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_fatal() {
        let err = Error::invalid_config("monitor mode should be either 'min' or 'max'");
        assert!(err.is_fatal());

        let err = Error::StepFailed {
            epoch: 3,
            message: "exit status 1".to_string(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = Error::CheckpointCorrupted {
            checkpoint_id: "model_best.ckpt".to_string(),
            reason: "bad magic".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Checkpoint corrupted: model_best.ckpt - bad magic"
        );
    }
}
