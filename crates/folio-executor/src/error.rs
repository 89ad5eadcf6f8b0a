//! Executor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] folio_broker::BrokerError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Failure of one brokerage transaction call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Timeout or connection failure; the call may be retried.
    #[error("{0}")]
    Transport(String),

    /// The broker rejected the request. Carries the broker message verbatim.
    #[error("{0}")]
    Business(String),

    /// No bearer credential could be obtained.
    #[error("Auth token error: {0}")]
    Credential(String),
}

impl SubmitError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<folio_broker::BrokerError> for SubmitError {
    fn from(e: folio_broker::BrokerError) -> Self {
        use folio_broker::BrokerError;
        match e {
            BrokerError::Api { message, .. } => Self::Business(message),
            BrokerError::Credential(msg) => Self::Credential(msg),
            other if other.is_transport() => Self::Transport(other.to_string()),
            other => Self::Business(other.to_string()),
        }
    }
}
