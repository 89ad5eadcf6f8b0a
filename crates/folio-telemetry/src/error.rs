//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed, or the filter was invalid.
    #[error("Cannot install tracing subscriber: {0}")]
    LoggingInit(String),

    /// Gathered metric families could not be rendered as text.
    #[error("Cannot render metrics: {0}")]
    Metrics(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
