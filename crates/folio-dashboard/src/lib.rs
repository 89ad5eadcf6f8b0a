//! folio-dashboard - Read-only view of the manager's recent cycles.
//!
//! - `GET /api/last-cycle`: last decision and risk cycle reports
//! - `GET /ws`: snapshot on connect, then one message per finished cycle
//! - `GET /metrics`: Prometheus text format
//! - `POST /api/decision`: request an immediate decision cycle
//! - `GET /api/portfolio`: live account snapshot
//! - `GET /api/buyable?ticker=`: orderable cash for a ticker
//!
//! # Usage
//!
//! ```ignore
//! use folio_dashboard::{run_server, DashboardConfig, DashboardState};
//!
//! let (dashboard, trigger_rx) = DashboardState::with_trigger();
//! let dashboard = dashboard.with_account(account.clone());
//! tokio::spawn(run_server(dashboard.clone(), DashboardConfig::default(), shutdown.clone()));
//! ```

mod config;
mod error;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server, AppState};
pub use state::{DashboardState, TriggerResult};
pub use types::{CycleLoop, CycleReport, CycleStatus, DashboardMessage, DashboardSnapshot};
