//! Decision engine error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid advisor payload: {0}")]
    InvalidAdvisorPayload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DecisionResult<T> = Result<T, DecisionError>;
