//! Error types for process supervision.

use thiserror::Error;

/// Result type alias for process operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Errors that can occur while supervising a subprocess.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Subprocess pipe unavailable: {0}")]
    MissingPipe(&'static str),

    #[error("Process already waited on")]
    AlreadyWaited,

    #[error("Background task failed: {0}")]
    TaskJoin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
