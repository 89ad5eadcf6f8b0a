//! Portfolio snapshot types.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A held position.
///
/// `profit_loss_rate` is a fraction (`-0.05` is a 5% loss), and
/// `weight_in_portfolio` is `eval_amount / total_value` (0 when the total is 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    pub shares: u64,
    pub avg_price: Decimal,
    pub current_price: Decimal,
    pub eval_amount: Decimal,
    pub profit_loss_rate: f64,
    pub weight_in_portfolio: f64,
}

impl Position {
    /// Build a position, deriving the P/L rate and portfolio weight.
    #[must_use]
    pub fn new(
        ticker: impl Into<String>,
        name: impl Into<String>,
        shares: u64,
        avg_price: Decimal,
        current_price: Decimal,
        eval_amount: Decimal,
        total_value: Decimal,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            shares,
            avg_price,
            current_price,
            eval_amount,
            profit_loss_rate: profit_loss_rate(avg_price, current_price),
            weight_in_portfolio: ratio(eval_amount, total_value),
        }
    }
}

/// `(current - avg) / avg`, 0 when the average price is not positive.
#[must_use]
pub fn profit_loss_rate(avg_price: Decimal, current_price: Decimal) -> f64 {
    if avg_price <= Decimal::ZERO {
        return 0.0;
    }
    ((current_price - avg_price) / avg_price)
        .to_f64()
        .unwrap_or(0.0)
}

/// `part / whole` as f64, 0 when `whole` is not positive.
#[must_use]
pub fn ratio(part: Decimal, whole: Decimal) -> f64 {
    if whole <= Decimal::ZERO {
        return 0.0;
    }
    (part / whole).to_f64().unwrap_or(0.0)
}

/// Account state at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    pub total_value: Decimal,
    pub positions: Vec<Position>,
    /// Served from cache because the live refresh failed.
    ///
    /// A stale snapshot is only good enough for stop-loss checks, never for sizing.
    #[serde(default)]
    pub data_stale: bool,
    pub as_of: DateTime<Utc>,
}

impl PortfolioSnapshot {
    #[must_use]
    pub fn new(cash: Decimal, total_value: Decimal, positions: Vec<Position>) -> Self {
        Self {
            cash,
            total_value,
            positions,
            data_stale: false,
            as_of: Utc::now(),
        }
    }

    /// Look up a held position by ticker.
    #[must_use]
    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.ticker == ticker)
    }

    /// Current notional held in `ticker` (0 if not held).
    #[must_use]
    pub fn held_notional(&self, ticker: &str) -> Decimal {
        self.position(ticker)
            .map(|p| p.eval_amount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Copy of this snapshot flagged as served from cache.
    #[must_use]
    pub fn as_stale(&self) -> Self {
        Self {
            data_stale: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_derives_rate_and_weight() {
        let p = Position::new(
            "005930",
            "Samsung",
            10,
            dec!(70000),
            dec!(65800),
            dec!(658000),
            dec!(2000000),
        );
        assert!((p.profit_loss_rate - (-0.06)).abs() < 1e-9);
        assert!((p.weight_in_portfolio - 0.329).abs() < 1e-9);
    }

    #[test]
    fn test_weight_zero_when_total_zero() {
        let p = Position::new("A", "", 1, dec!(100), dec!(100), dec!(100), Decimal::ZERO);
        assert_eq!(p.weight_in_portfolio, 0.0);
    }

    #[test]
    fn test_rate_zero_when_avg_price_zero() {
        assert_eq!(profit_loss_rate(Decimal::ZERO, dec!(100)), 0.0);
    }

    #[test]
    fn test_as_stale_and_lookup() {
        let snap = PortfolioSnapshot::new(
            dec!(1000),
            dec!(2000),
            vec![Position::new("A", "", 1, dec!(1000), dec!(1000), dec!(1000), dec!(2000))],
        );
        assert!(!snap.data_stale);
        let stale = snap.as_stale();
        assert!(stale.data_stale);
        assert_eq!(stale.held_notional("A"), dec!(1000));
        assert_eq!(stale.held_notional("B"), Decimal::ZERO);
    }
}
