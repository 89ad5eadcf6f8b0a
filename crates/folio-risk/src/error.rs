//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No fresh portfolio snapshot; the cycle is skipped.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
