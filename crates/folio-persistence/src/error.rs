//! Journal error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Creating, opening or writing a journal file failed.
    #[error("Journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Outcome record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The daily writer could not be opened for the current date.
    #[error("Journal writer unavailable: {0}")]
    WriterUnavailable(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
