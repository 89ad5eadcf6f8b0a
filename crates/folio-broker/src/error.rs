//! Brokerage and provider error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Request never got a usable HTTP response (connect error, timeout).
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// The brokerage answered but rejected the request (`rt_cd != "0"`).
    #[error("Brokerage rejected request: [{code}] {message}")]
    Api { code: String, message: String },

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrokerError {
    /// Transport-level failure worth retrying.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::HttpClient(_))
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
