//! Core domain types for the folio trading engine.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `SignalSample`, `AggregatedSignal`: normalized analysis signals
//! - `PortfolioSnapshot`, `Position`: brokerage account state
//! - `TargetAction`, `Constraints`: decision output and its limits
//! - `OrderMessage`, `OrderOutcome`, `PendingOrder`: the order wire protocol
//! - Market-hours helpers for loop gating

pub mod action;
pub mod error;
pub mod execution;
pub mod market_hours;
pub mod order;
pub mod portfolio;
pub mod signal;

pub use action::{ActionKind, Constraints, TargetAction};
pub use error::{CoreError, Result};
pub use execution::{CancelRequest, CancelResult, CancelableOrder, OrderState, PendingOrder};
pub use market_hours::{Clock, MarketHours, SystemClock};
pub use order::{OrderMessage, OrderOutcome, OrderSide, OrderStyle, OutcomeStatus, RequestId};
pub use portfolio::{PortfolioSnapshot, Position};
pub use signal::{AggregatedSignal, SignalSample};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
