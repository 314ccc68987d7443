//! Error types for the engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while processing tool output.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Plan JSON could not be parsed: {0}")]
    PlanJson(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
