//! Error types for the recovery layer.

use thiserror::Error;

/// Result type alias for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Errors that can occur while running operations and remediations.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Process error: {0}")]
    Process(#[from] terrapin_process::ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
