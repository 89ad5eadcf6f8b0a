//! Order limits with suggested follow-up orders.
//!
//! A limit order priced below `min_cost` or larger than `max_notional` is
//! failed, and the outcome carries an adjusted order the client may send next.
//! Market orders carry no price and are not checked.

use folio_core::{OrderMessage, OrderOutcome, OrderStyle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Order limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLimits {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum acceptable limit price.
    #[serde(default = "default_min_cost")]
    pub min_cost: Decimal,
    /// Maximum `limit_price * quantity` per order.
    #[serde(default = "default_max_notional")]
    pub max_notional: Decimal,
    /// Price factor applied when suggesting a smaller order.
    #[serde(default = "default_discount")]
    pub discount: Decimal,
}

fn default_enabled() -> bool {
    true
}

fn default_min_cost() -> Decimal {
    dec!(1.0)
}

fn default_max_notional() -> Decimal {
    dec!(100000)
}

fn default_discount() -> Decimal {
    dec!(0.95)
}

impl Default for OrderLimits {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            min_cost: default_min_cost(),
            max_notional: default_max_notional(),
            discount: default_discount(),
        }
    }
}

/// Why a limit order was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitBreach {
    BelowMinCost { price: Decimal },
    AboveMaxNotional { notional: Decimal },
}

impl OrderLimits {
    /// Check `order`; `None` when it may be submitted.
    #[must_use]
    pub fn check(&self, order: &OrderMessage) -> Option<LimitBreach> {
        if !self.enabled || order.order_style != OrderStyle::Limit {
            return None;
        }
        if order.limit_price < self.min_cost {
            return Some(LimitBreach::BelowMinCost {
                price: order.limit_price,
            });
        }
        let notional = order.notional();
        if notional > self.max_notional {
            return Some(LimitBreach::AboveMaxNotional { notional });
        }
        None
    }

    /// Adjusted order for `breach`, with a fresh request id.
    #[must_use]
    pub fn suggestion(&self, order: &OrderMessage, breach: &LimitBreach) -> OrderMessage {
        match breach {
            LimitBreach::BelowMinCost { .. } => {
                OrderMessage::limit(order.kind, order.ticker.clone(), order.quantity, self.min_cost)
            }
            LimitBreach::AboveMaxNotional { .. } => {
                let discounted = (order.limit_price * self.discount)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                let unit = discounted.max(self.min_cost);
                let quantity = (self.max_notional / unit).floor().to_u64().unwrap_or(0);
                OrderMessage::limit(order.kind, order.ticker.clone(), quantity, discounted)
            }
        }
    }

    /// Failed outcome with a suggestion, or `None` when the order passes.
    #[must_use]
    pub fn enforce(&self, order: &OrderMessage) -> Option<OrderOutcome> {
        let breach = self.check(order)?;
        let next = self.suggestion(order, &breach);
        let message = match &breach {
            LimitBreach::BelowMinCost { price } => {
                format!("Limit price {price} below minimum {}", self.min_cost)
            }
            LimitBreach::AboveMaxNotional { notional } => {
                format!("Order notional {notional} exceeds maximum {}", self.max_notional)
            }
        };
        debug!(
            request_id = %order.request_id,
            suggested_quantity = next.quantity,
            suggested_price = %next.limit_price,
            "Order refused by limits"
        );
        Some(OrderOutcome::failed(order.request_id.clone(), message).with_suggestion(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::OrderSide;

    #[test]
    fn test_price_below_min_cost_suggests_min_cost() {
        let limits = OrderLimits::default();
        let order = OrderMessage::limit(OrderSide::Buy, "AAA", 10, dec!(0.5));

        let outcome = limits.enforce(&order).unwrap();
        assert!(outcome.is_failed());
        let next = outcome.next_action.unwrap();
        assert_eq!(next.limit_price, dec!(1.0));
        assert_eq!(next.quantity, 10);
        assert_ne!(next.request_id, order.request_id);
    }

    #[test]
    fn test_oversized_order_suggests_reduced_size() {
        let limits = OrderLimits::default();
        // 100 * 2000 = 200,000 > 100,000
        let order = OrderMessage::limit(OrderSide::Buy, "AAA", 2000, dec!(100));

        let outcome = limits.enforce(&order).unwrap();
        let next = outcome.next_action.unwrap();
        assert_eq!(next.limit_price, dec!(95.00));
        assert_eq!(next.quantity, 1052);
        assert!(next.notional() <= limits.max_notional);
    }

    #[test]
    fn test_within_limits_passes() {
        let limits = OrderLimits::default();
        let order = OrderMessage::limit(OrderSide::Sell, "AAA", 10, dec!(1000));
        assert!(limits.enforce(&order).is_none());
    }

    #[test]
    fn test_market_orders_bypass() {
        let limits = OrderLimits::default();
        let order = OrderMessage::market(OrderSide::Buy, "AAA", 1_000_000);
        assert!(limits.check(&order).is_none());
    }

    #[test]
    fn test_disabled() {
        let limits = OrderLimits {
            enabled: false,
            ..Default::default()
        };
        let order = OrderMessage::limit(OrderSide::Buy, "AAA", 10, dec!(0.5));
        assert!(limits.enforce(&order).is_none());
    }
}
