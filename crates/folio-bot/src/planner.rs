//! Turns sized target actions into market orders.
//!
//! Sell quantities are always checked against the brokerage's live sellable
//! quantity, so a rebalance can never sell more than is actually held.

use folio_broker::AccountReader;
use folio_core::{ActionKind, OrderMessage, OrderSide, TargetAction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

/// An action that produced no order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedAction {
    pub ticker: String,
    pub reason: String,
}

/// Orders to dispatch, in action order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderPlan {
    pub orders: Vec<OrderMessage>,
    pub skipped: Vec<SkippedAction>,
}

impl OrderPlan {
    fn skip(&mut self, ticker: &str, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(ticker, reason = %reason, "Action skipped");
        self.skipped.push(SkippedAction {
            ticker: ticker.to_string(),
            reason,
        });
    }
}

/// Whole shares affordable with `notional` at `price`.
pub fn buy_quantity(notional: Decimal, price: Decimal) -> u64 {
    if price <= Decimal::ZERO || notional <= Decimal::ZERO {
        return 0;
    }
    (notional / price).floor().to_u64().unwrap_or(0)
}

/// Shares to sell for `action` given what is sellable now.
///
/// A zero target weight is a full exit; otherwise the notional is converted at
/// the reference price and capped at `sellable`.
pub fn sell_quantity(action: &TargetAction, sellable: u64) -> u64 {
    if action.target_weight <= 0.0 {
        return sellable;
    }
    buy_quantity(action.order_notional.abs(), action.reference_price).min(sellable)
}

/// Build the order list for a cycle's actions. HOLD entries are ignored.
pub async fn plan_orders(actions: &[TargetAction], account: &dyn AccountReader) -> OrderPlan {
    let mut plan = OrderPlan::default();

    for action in actions {
        match action.kind {
            ActionKind::Hold => {}
            ActionKind::Buy => {
                let quantity = buy_quantity(action.order_notional, action.reference_price);
                if quantity == 0 {
                    plan.skip(&action.ticker, "buy quantity rounds to zero");
                    continue;
                }
                plan.orders
                    .push(OrderMessage::market(OrderSide::Buy, action.ticker.clone(), quantity));
            }
            ActionKind::Sell => {
                let sellable = match account.sellable_quantity(&action.ticker).await {
                    Ok(sellable) => sellable,
                    Err(e) => {
                        warn!(ticker = %action.ticker, error = %e, "Sellable quantity unavailable");
                        plan.skip(&action.ticker, format!("sellable quantity unavailable: {e}"));
                        continue;
                    }
                };
                let quantity = sell_quantity(action, sellable);
                if quantity == 0 {
                    plan.skip(&action.ticker, "nothing sellable");
                    continue;
                }
                plan.orders
                    .push(OrderMessage::market(OrderSide::Sell, action.ticker.clone(), quantity));
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_broker::MockAccountReader;
    use folio_core::OrderStyle;
    use rust_decimal_macros::dec;

    fn action(ticker: &str, kind: ActionKind, weight: f64, notional: Decimal, price: Decimal) -> TargetAction {
        TargetAction {
            ticker: ticker.to_string(),
            kind,
            target_weight: weight,
            priority: 1,
            strength: 0.5,
            rationale: String::new(),
            order_notional: notional,
            reference_price: price,
        }
    }

    #[test]
    fn test_buy_quantity_floors() {
        assert_eq!(buy_quantity(dec!(250000), dec!(70000)), 3);
        assert_eq!(buy_quantity(dec!(69999), dec!(70000)), 0);
        assert_eq!(buy_quantity(dec!(100000), Decimal::ZERO), 0);
        assert_eq!(buy_quantity(dec!(-100000), dec!(100)), 0);
    }

    #[test]
    fn test_partial_sell_capped_by_sellable() {
        let a = action("AAA", ActionKind::Sell, 0.1, dec!(-500000), dec!(10000));
        assert_eq!(sell_quantity(&a, 100), 50);
        assert_eq!(sell_quantity(&a, 20), 20);
    }

    #[test]
    fn test_full_exit_sells_everything_sellable() {
        let a = action("AAA", ActionKind::Sell, 0.0, dec!(-1), dec!(10000));
        assert_eq!(sell_quantity(&a, 37), 37);
    }

    #[tokio::test]
    async fn test_plan_orders() {
        let account = MockAccountReader::new();
        account.set_sellable("SELL", 8);

        let actions = vec![
            action("BUY", ActionKind::Buy, 0.2, dec!(300000), dec!(100000)),
            action("HOLD", ActionKind::Hold, 0.1, Decimal::ZERO, dec!(1000)),
            action("SELL", ActionKind::Sell, 0.0, dec!(-800000), dec!(100000)),
            action("DUST", ActionKind::Buy, 0.2, dec!(50), dec!(100000)),
            action("NONE", ActionKind::Sell, 0.05, dec!(-200000), dec!(100000)),
        ];

        let plan = plan_orders(&actions, &account).await;

        assert_eq!(plan.orders.len(), 2);
        assert_eq!(plan.orders[0].ticker, "BUY");
        assert_eq!(plan.orders[0].kind, OrderSide::Buy);
        assert_eq!(plan.orders[0].quantity, 3);
        assert_eq!(plan.orders[0].order_style, OrderStyle::Market);
        assert_eq!(plan.orders[1].ticker, "SELL");
        assert_eq!(plan.orders[1].quantity, 8);
        assert_ne!(plan.orders[0].request_id, plan.orders[1].request_id);

        let skipped: Vec<&str> = plan.skipped.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(skipped, vec!["DUST", "NONE"]);
    }
}
