//! Error types for folio-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Empty signal sample from {0}")]
    EmptySignal(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid constraints: {0}")]
    InvalidConstraints(String),

    #[error("Invalid market hours: {0}")]
    InvalidMarketHours(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
