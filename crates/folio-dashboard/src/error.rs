//! Dashboard error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
