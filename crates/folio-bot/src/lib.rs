//! folio portfolio manager and execution service.
//!
//! Wires the library crates into two processes:
//! - the manager: decision loop, risk loop, outcome journal, dashboard
//! - the execution service: order channel in front of the paper or live broker

pub mod app;
pub mod config;
pub mod cycle;
pub mod error;
pub mod planner;
pub mod schedule;
pub mod supervisor;

pub use app::{ExecutionService, Manager};
pub use config::{ExecutionConfig, ManagerConfig, OperatingMode};
pub use cycle::{CycleRecorder, DecisionCycle};
pub use error::{AppError, AppResult};
pub use schedule::{DecisionLoop, RiskLoop};
pub use supervisor::Supervisor;
