//! Order channel error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Message parse error: {0}")]
    ParseError(String),

    #[error("Dispatcher is shut down")]
    Shutdown,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// The channel is gone and the order may be re-sent on a fresh one.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { .. } | Self::SendFailed(_) | Self::Tungstenite(_)
        )
    }
}

pub type WsResult<T> = Result<T, WsError>;
