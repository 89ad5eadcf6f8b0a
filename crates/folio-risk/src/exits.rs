//! Exit trigger evaluation.

use std::fmt;

use folio_core::PortfolioSnapshot;
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;

/// Why a position is being exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    StopLoss,
    TakeProfit,
}

impl ExitTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
        }
    }
}

impl fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position that crossed an exit threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitCandidate {
    pub ticker: String,
    pub trigger: ExitTrigger,
    pub profit_loss_rate: f64,
}

/// Classify one P/L rate. Both bounds are inclusive.
#[must_use]
pub fn trigger_for(profit_loss_rate: f64, config: &RiskConfig) -> Option<ExitTrigger> {
    if profit_loss_rate <= config.stop_loss_threshold {
        Some(ExitTrigger::StopLoss)
    } else if profit_loss_rate >= config.take_profit_threshold {
        Some(ExitTrigger::TakeProfit)
    } else {
        None
    }
}

/// Positions in `snapshot` that must be fully exited, in holding order.
#[must_use]
pub fn evaluate_exits(snapshot: &PortfolioSnapshot, config: &RiskConfig) -> Vec<ExitCandidate> {
    snapshot
        .positions
        .iter()
        .filter(|p| p.shares > 0)
        .filter_map(|p| {
            trigger_for(p.profit_loss_rate, config).map(|trigger| ExitCandidate {
                ticker: p.ticker.clone(),
                trigger,
                profit_loss_rate: p.profit_loss_rate,
            })
        })
        .collect()
}
