//! Structured logging and Prometheus metrics for the folio services.
//!
//! - [`init_logging`]: tracing subscriber with env filter, JSON in production
//! - [`Metrics`]: counters, gauges and histograms for dispatch, execution and loops
//! - [`render_metrics`]: Prometheus text exposition for `/metrics`

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{render as render_metrics, Metrics};
