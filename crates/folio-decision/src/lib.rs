//! Decision engine for the folio trading loop.
//!
//! Turns a portfolio snapshot, the current signal samples and a candidate
//! universe into an ordered list of target actions under risk constraints.
//! The engine is pure: given the same inputs it returns the same decision.
//!
//! Intents come from one of two sources:
//! - the aggregated signal, classified against a threshold
//! - a validated advisor document (see [`advisor`])
//!
//! Both go through the same sizing, clamping and truncation pipeline.

pub mod advisor;
pub mod config;
pub mod engine;
pub mod error;

pub use advisor::{parse_advisor_payload, AdvisorDecision, GlobalView, RiskAction, TickerDecision};
pub use config::{DecisionConfig, DecisionSource};
pub use engine::{Bias, Decision, DecisionEngine, UniverseEntry};
pub use error::{DecisionError, DecisionResult};
