//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] folio_broker::BrokerError),

    #[error("Executor error: {0}")]
    Executor(#[from] folio_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] folio_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] folio_persistence::PersistenceError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] folio_dashboard::DashboardError),

    #[error("{loop_name} loop panicked: {message}")]
    TaskPanicked { loop_name: &'static str, message: String },

    #[error("{loop_name} loop gave up after {restarts} restarts")]
    RestartsExhausted { loop_name: &'static str, restarts: u32 },
}

pub type AppResult<T> = Result<T, AppError>;
