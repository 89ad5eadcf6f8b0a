//! Decision output: target actions and the constraints that bound them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Intent for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Buy,
    Sell,
    Hold,
}

impl ActionKind {
    #[must_use]
    pub fn is_hold(&self) -> bool {
        matches!(self, Self::Hold)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// One entry of a cycle's decision.
///
/// HOLD actions carry no execution obligation. For BUY/SELL, `order_notional`
/// is the signed amount to trade (`target notional - held notional`) and
/// `reference_price` the price used to turn it into a share quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAction {
    pub ticker: String,
    pub kind: ActionKind,
    /// Desired portfolio weight in `[0, 1]`.
    pub target_weight: f64,
    /// Lower is more urgent.
    pub priority: u32,
    /// Conviction in `[0, 1]`.
    pub strength: f64,
    pub rationale: String,
    #[serde(default)]
    pub order_notional: Decimal,
    #[serde(default)]
    pub reference_price: Decimal,
}

impl TargetAction {
    /// A HOLD entry for `ticker`.
    #[must_use]
    pub fn hold(ticker: impl Into<String>, current_weight: f64, rationale: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            kind: ActionKind::Hold,
            target_weight: current_weight.clamp(0.0, 1.0),
            priority: u32::MAX,
            strength: 0.0,
            rationale: rationale.into(),
            order_notional: Decimal::ZERO,
            reference_price: Decimal::ZERO,
        }
    }
}

/// Risk limits applied to every decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Orders smaller than this (absolute notional) are dropped.
    #[serde(default = "default_min_order_notional")]
    pub min_order_notional: Decimal,
    /// Upper bound on any single ticker's target weight, in `(0, 1]`.
    #[serde(default = "default_max_single_ticker_weight")]
    pub max_single_ticker_weight: f64,
    /// Fraction of portfolio value that may be traded per cycle, in `(0, 1]`.
    #[serde(default = "default_max_turnover_ratio")]
    pub max_turnover_ratio: f64,
    #[serde(default = "default_max_candidates")]
    pub max_buy_candidates: usize,
    #[serde(default = "default_max_candidates")]
    pub max_sell_candidates: usize,
}

fn default_min_order_notional() -> Decimal {
    Decimal::from(100_000)
}

fn default_max_single_ticker_weight() -> f64 {
    0.2
}

fn default_max_turnover_ratio() -> f64 {
    0.3
}

fn default_max_candidates() -> usize {
    3
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            min_order_notional: default_min_order_notional(),
            max_single_ticker_weight: default_max_single_ticker_weight(),
            max_turnover_ratio: default_max_turnover_ratio(),
            max_buy_candidates: default_max_candidates(),
            max_sell_candidates: default_max_candidates(),
        }
    }
}

impl Constraints {
    /// Check the configured ranges.
    pub fn validate(&self) -> Result<()> {
        if self.min_order_notional < Decimal::ZERO {
            return Err(CoreError::InvalidConstraints(
                "min_order_notional must be >= 0".to_string(),
            ));
        }
        if !(self.max_single_ticker_weight > 0.0 && self.max_single_ticker_weight <= 1.0) {
            return Err(CoreError::InvalidConstraints(format!(
                "max_single_ticker_weight must be in (0, 1], got {}",
                self.max_single_ticker_weight
            )));
        }
        if !(self.max_turnover_ratio > 0.0 && self.max_turnover_ratio <= 1.0) {
            return Err(CoreError::InvalidConstraints(format!(
                "max_turnover_ratio must be in (0, 1], got {}",
                self.max_turnover_ratio
            )));
        }
        Ok(())
    }

    /// Upper bound on non-HOLD actions per cycle.
    #[must_use]
    pub fn max_active_actions(&self) -> usize {
        self.max_buy_candidates + self.max_sell_candidates
    }
}
