//! Risk monitor: stop-loss and take-profit exits.
//!
//! Runs on its own cadence, independent of the decision cycle:
//! - [`evaluate_exits`]: positions past a P/L threshold (both bounds inclusive)
//! - [`RiskMonitor`]: fresh snapshot per cycle, full-exit market sells through
//!   the shared order sink, volume-adaptive next interval

pub mod config;
pub mod error;
pub mod exits;
pub mod monitor;

pub use config::RiskConfig;
pub use error::{RiskError, RiskResult};
pub use exits::{evaluate_exits, trigger_for, ExitCandidate, ExitTrigger};
pub use monitor::{ExitRecord, RiskMonitor, RiskReport};
