//! Decision engine implementation.
//!
//! Pipeline per cycle:
//! 1. Build intents (from the aggregated signal or a validated advisor document)
//! 2. Clamp each intent's target weight to `max_single_ticker_weight`
//! 3. Size: `order_notional = total_value * target_weight - held_notional`,
//!    dropping wrong-direction and dust-sized orders
//! 4. Truncate buys and sells to their candidate limits by strength
//! 5. Spend the turnover budget in emission order (sells first, then buys)

use folio_core::{
    ActionKind, AggregatedSignal, Constraints, PortfolioSnapshot, SignalSample, TargetAction,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::advisor::{parse_advisor_payload, AdvisorDecision};
use crate::config::DecisionConfig;
use crate::error::{DecisionError, DecisionResult};

/// A ticker eligible for this cycle, with the price used for sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    pub current_price: Decimal,
    /// Currently held in the portfolio.
    #[serde(default)]
    pub held: bool,
}

/// Overall direction derived from the aggregated signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Buy,
    Sell,
    /// Signal present but within the threshold band.
    Neutral,
    /// No samples at all.
    NoSignal,
    /// Intents supplied by the advisor.
    Advisor,
}

/// Result of one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Ordered actions; dispatch in this order.
    pub actions: Vec<TargetAction>,
    pub signal: Option<AggregatedSignal>,
    pub bias: Bias,
    pub target_cash_ratio: f64,
    pub comment: String,
}

impl Decision {
    /// BUY and SELL actions only.
    pub fn active_actions(&self) -> impl Iterator<Item = &TargetAction> {
        self.actions.iter().filter(|a| !a.kind.is_hold())
    }

    #[must_use]
    pub fn is_all_hold(&self) -> bool {
        self.actions.iter().all(|a| a.kind.is_hold())
    }
}

/// An unsized per-ticker intent.
#[derive(Debug, Clone)]
struct Intent {
    ticker: String,
    kind: ActionKind,
    target_weight: f64,
    strength: f64,
    priority: u32,
    rationale: String,
}

/// Decision engine.
///
/// Stateless apart from its configuration; every method is a pure function
/// of its arguments.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Decide from signal samples.
    ///
    /// Fails only when the snapshot cannot be used for sizing (stale); the
    /// caller aborts the cycle without dispatching anything.
    pub fn decide(
        &self,
        snapshot: &PortfolioSnapshot,
        samples: &[SignalSample],
        universe: &[UniverseEntry],
        constraints: &Constraints,
    ) -> DecisionResult<Decision> {
        ensure_fresh(snapshot)?;

        let Some(signal) = AggregatedSignal::from_samples(samples) else {
            info!(universe = universe.len(), "No signal samples, holding everything");
            return Ok(self.all_hold(snapshot, universe, None, "no signal samples available"));
        };

        let threshold = self.config.signal_threshold;
        let strength = signal.average.abs().min(1.0);

        // Ties with the threshold stay neutral.
        let bias = if signal.average > threshold {
            Bias::Buy
        } else if signal.average < -threshold {
            Bias::Sell
        } else {
            Bias::Neutral
        };

        debug!(
            average = signal.average,
            samples = signal.sample_count,
            ?bias,
            "Signal classified"
        );

        let intents: Vec<Intent> = match bias {
            Bias::Buy => universe
                .iter()
                .enumerate()
                .map(|(i, entry)| Intent {
                    ticker: entry.ticker.clone(),
                    kind: ActionKind::Buy,
                    target_weight: strength,
                    strength,
                    priority: i as u32,
                    rationale: format!("average signal {:.4} above {threshold}", signal.average),
                })
                .collect(),
            Bias::Sell => snapshot
                .positions
                .iter()
                .enumerate()
                .map(|(i, p)| Intent {
                    ticker: p.ticker.clone(),
                    kind: ActionKind::Sell,
                    target_weight: p.weight_in_portfolio * (1.0 - strength),
                    strength,
                    priority: i as u32,
                    rationale: format!("average signal {:.4} below -{threshold}", signal.average),
                })
                .collect(),
            _ => Vec::new(),
        };

        let actions = size_and_filter(intents, snapshot, universe, constraints);
        let comment = format!("{bias:?} bias from {} samples", signal.sample_count);

        Ok(Decision {
            actions,
            signal: Some(signal),
            bias,
            target_cash_ratio: folio_core::portfolio::ratio(snapshot.cash, snapshot.total_value),
            comment,
        })
    }

    /// Decide from an advisor document.
    ///
    /// Any validation failure degrades to an all-HOLD decision.
    pub fn decide_from_advisor(
        &self,
        snapshot: &PortfolioSnapshot,
        raw_payload: &str,
        universe: &[UniverseEntry],
        constraints: &Constraints,
    ) -> DecisionResult<Decision> {
        ensure_fresh(snapshot)?;

        let tickers: Vec<&str> = universe.iter().map(|u| u.ticker.as_str()).collect();
        let advisor = match parse_advisor_payload(raw_payload, &tickers) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "Advisor payload rejected, holding everything");
                return Ok(self.all_hold(snapshot, universe, None, &format!("advisor payload rejected: {e}")));
            }
        };

        Ok(self.decide_from_validated(snapshot, advisor, universe, constraints))
    }

    fn decide_from_validated(
        &self,
        snapshot: &PortfolioSnapshot,
        advisor: AdvisorDecision,
        universe: &[UniverseEntry],
        constraints: &Constraints,
    ) -> Decision {
        let intents = advisor
            .ticker_decisions
            .into_iter()
            .filter(|d| !d.action.is_hold())
            .map(|d| Intent {
                ticker: d.ticker,
                kind: d.action,
                target_weight: d.target_weight,
                strength: d.strength,
                priority: d.priority,
                rationale: d.reason,
            })
            .collect();

        Decision {
            actions: size_and_filter(intents, snapshot, universe, constraints),
            signal: None,
            bias: Bias::Advisor,
            target_cash_ratio: advisor.global_view.target_cash_ratio,
            comment: advisor
                .meta
                .overall_comment
                .unwrap_or_else(|| advisor.global_view.macro_bias.clone()),
        }
    }

    /// Capital-preservation default: HOLD every universe ticker.
    fn all_hold(
        &self,
        snapshot: &PortfolioSnapshot,
        universe: &[UniverseEntry],
        signal: Option<AggregatedSignal>,
        reason: &str,
    ) -> Decision {
        let actions = universe
            .iter()
            .map(|u| {
                let weight = snapshot
                    .position(&u.ticker)
                    .map(|p| p.weight_in_portfolio)
                    .unwrap_or(0.0);
                TargetAction::hold(u.ticker.clone(), weight, reason)
            })
            .collect();

        Decision {
            actions,
            signal,
            bias: Bias::NoSignal,
            target_cash_ratio: self.config.no_signal_cash_ratio,
            comment: reason.to_string(),
        }
    }
}

fn ensure_fresh(snapshot: &PortfolioSnapshot) -> DecisionResult<()> {
    if snapshot.data_stale {
        return Err(DecisionError::DataUnavailable(
            "portfolio snapshot is stale; refusing to size orders".to_string(),
        ));
    }
    Ok(())
}

/// Price for sizing: the universe entry, else the held position.
fn reference_price(ticker: &str, snapshot: &PortfolioSnapshot, universe: &[UniverseEntry]) -> Decimal {
    universe
        .iter()
        .find(|u| u.ticker == ticker)
        .map(|u| u.current_price)
        .filter(|p| *p > Decimal::ZERO)
        .or_else(|| snapshot.position(ticker).map(|p| p.current_price))
        .unwrap_or(Decimal::ZERO)
}

/// Stable sort by strength, strongest first; equal strengths keep input order.
fn by_strength(actions: &mut [TargetAction]) {
    actions.sort_by(|a, b| b.strength.total_cmp(&a.strength));
}

fn size_and_filter(
    intents: Vec<Intent>,
    snapshot: &PortfolioSnapshot,
    universe: &[UniverseEntry],
    constraints: &Constraints,
) -> Vec<TargetAction> {
    let total = snapshot.total_value;
    let mut buys = Vec::new();
    let mut sells = Vec::new();

    for intent in intents {
        let target_weight = intent
            .target_weight
            .clamp(0.0, constraints.max_single_ticker_weight);
        let price = reference_price(&intent.ticker, snapshot, universe);
        if price <= Decimal::ZERO {
            debug!(ticker = %intent.ticker, "No reference price, skipping");
            continue;
        }

        let target_notional = total * Decimal::from_f64(target_weight).unwrap_or(Decimal::ZERO);
        let order_notional = target_notional - snapshot.held_notional(&intent.ticker);

        let wrong_direction = match intent.kind {
            ActionKind::Buy => order_notional <= Decimal::ZERO,
            ActionKind::Sell => order_notional >= Decimal::ZERO,
            ActionKind::Hold => true,
        };
        if wrong_direction {
            debug!(ticker = %intent.ticker, kind = %intent.kind, %order_notional, "Already at target");
            continue;
        }
        if order_notional.abs() < constraints.min_order_notional {
            debug!(ticker = %intent.ticker, %order_notional, "Below minimum order notional");
            continue;
        }

        let action = TargetAction {
            ticker: intent.ticker,
            kind: intent.kind,
            target_weight,
            priority: intent.priority,
            strength: intent.strength.clamp(0.0, 1.0),
            rationale: intent.rationale,
            order_notional,
            reference_price: price,
        };
        match action.kind {
            ActionKind::Buy => buys.push(action),
            _ => sells.push(action),
        }
    }

    by_strength(&mut sells);
    sells.truncate(constraints.max_sell_candidates);
    by_strength(&mut buys);
    buys.truncate(constraints.max_buy_candidates);

    let budget = total * Decimal::from_f64(constraints.max_turnover_ratio).unwrap_or(Decimal::ZERO);
    let mut spent = Decimal::ZERO;
    let mut out = Vec::with_capacity(sells.len() + buys.len());

    for mut action in sells.into_iter().chain(buys) {
        let remaining = budget - spent;
        let size = action.order_notional.abs();
        if size > remaining {
            if remaining < constraints.min_order_notional || remaining <= Decimal::ZERO {
                debug!(ticker = %action.ticker, "Turnover budget exhausted");
                continue;
            }
            // Shrink to what is left of the budget.
            action.order_notional = if action.kind == ActionKind::Buy {
                remaining
            } else {
                -remaining
            };
            let held = snapshot.held_notional(&action.ticker);
            action.target_weight = folio_core::portfolio::ratio(held + action.order_notional, total)
                .clamp(0.0, constraints.max_single_ticker_weight);
        }
        spent += action.order_notional.abs();
        out.push(action);
    }

    for (rank, action) in out.iter_mut().enumerate() {
        action.priority = rank as u32 + 1;
    }

    debug!(
        actions = out.len(),
        turnover = %spent,
        budget = %budget,
        "Actions sized"
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use folio_core::Position;
    use rust_decimal_macros::dec;

    fn sample(values: Vec<f64>) -> SignalSample {
        SignalSample::new("agent", Utc::now(), values).unwrap()
    }

    fn snapshot() -> PortfolioSnapshot {
        // total 10,000,000 with 1,000,000 in AAA (10%)
        PortfolioSnapshot::new(
            dec!(9000000),
            dec!(10000000),
            vec![Position::new(
                "AAA",
                "Alpha",
                100,
                dec!(10000),
                dec!(10000),
                dec!(1000000),
                dec!(10000000),
            )],
        )
    }

    fn universe() -> Vec<UniverseEntry> {
        ["AAA", "BBB", "CCC", "DDD", "EEE"]
            .iter()
            .map(|t| UniverseEntry {
                ticker: t.to_string(),
                name: String::new(),
                current_price: dec!(10000),
                held: *t == "AAA",
            })
            .collect()
    }

    fn wide_constraints() -> Constraints {
        Constraints {
            min_order_notional: dec!(100000),
            max_single_ticker_weight: 0.2,
            max_turnover_ratio: 1.0,
            max_buy_candidates: 3,
            max_sell_candidates: 3,
        }
    }

    #[test]
    fn test_scenario_a_buy_bias() {
        let engine = DecisionEngine::default();
        let d = engine
            .decide(&snapshot(), &[sample(vec![0.5, 0.7, -0.2])], &universe(), &wide_constraints())
            .unwrap();

        assert_eq!(d.bias, Bias::Buy);
        let signal = d.signal.unwrap();
        assert!((signal.average - 1.0 / 3.0).abs() < 1e-12);
        assert!(d.active_actions().all(|a| a.kind == ActionKind::Buy));
        assert!(d.active_actions().count() > 0);
    }

    #[test]
    fn test_scenario_b_within_threshold_is_empty() {
        let engine = DecisionEngine::default();
        let d = engine
            .decide(&snapshot(), &[sample(vec![0.05])], &universe(), &wide_constraints())
            .unwrap();

        assert_eq!(d.bias, Bias::Neutral);
        assert!(d.actions.is_empty());
    }

    #[test]
    fn test_threshold_tie_is_neutral() {
        let engine = DecisionEngine::default();
        let d = engine
            .decide(&snapshot(), &[sample(vec![0.1])], &universe(), &wide_constraints())
            .unwrap();
        assert_eq!(d.bias, Bias::Neutral);
    }

    #[test]
    fn test_no_samples_all_hold_with_elevated_cash() {
        let engine = DecisionEngine::default();
        let d = engine
            .decide(&snapshot(), &[], &universe(), &wide_constraints())
            .unwrap();

        assert_eq!(d.bias, Bias::NoSignal);
        assert!(d.is_all_hold());
        assert_eq!(d.actions.len(), 5);
        assert_eq!(d.target_cash_ratio, 0.5);
    }

    #[test]
    fn test_stale_snapshot_aborts() {
        let engine = DecisionEngine::default();
        let stale = snapshot().as_stale();
        let err = engine
            .decide(&stale, &[sample(vec![0.9])], &universe(), &wide_constraints())
            .unwrap_err();
        assert!(matches!(err, DecisionError::DataUnavailable(_)));
    }

    #[test]
    fn test_weight_clamped_and_held_notional_subtracted() {
        let engine = DecisionEngine::default();
        let d = engine
            .decide(&snapshot(), &[sample(vec![0.9])], &universe(), &wide_constraints())
            .unwrap();

        for a in d.active_actions() {
            assert!(a.target_weight <= 0.2 + 1e-12);
        }
        // AAA holds 1,000,000; target 20% = 2,000,000 -> buy 1,000,000
        let aaa = d.actions.iter().find(|a| a.ticker == "AAA").unwrap();
        assert_eq!(aaa.order_notional, dec!(1000000));
    }

    #[test]
    fn test_buy_candidates_truncated_in_universe_order() {
        let engine = DecisionEngine::default();
        let d = engine
            .decide(&snapshot(), &[sample(vec![0.9])], &universe(), &wide_constraints())
            .unwrap();

        let tickers: Vec<&str> = d.actions.iter().map(|a| a.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(
            d.actions.iter().map(|a| a.priority).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_min_order_notional_drops_dust() {
        let engine = DecisionEngine::default();
        let constraints = Constraints {
            min_order_notional: dec!(5000000),
            ..wide_constraints()
        };
        let d = engine
            .decide(&snapshot(), &[sample(vec![0.9])], &universe(), &constraints)
            .unwrap();
        assert!(d.actions.is_empty());
    }

    #[test]
    fn test_sell_bias_partial_reduction() {
        let engine = DecisionEngine::default();
        let d = engine
            .decide(&snapshot(), &[sample(vec![-0.5])], &universe(), &wide_constraints())
            .unwrap();

        assert_eq!(d.bias, Bias::Sell);
        assert_eq!(d.actions.len(), 1);
        let a = &d.actions[0];
        assert_eq!(a.kind, ActionKind::Sell);
        assert_eq!(a.ticker, "AAA");
        // weight 0.1 * (1 - 0.5) = 0.05 -> sell half of 1,000,000
        assert_eq!(a.order_notional, dec!(-500000));
    }

    #[test]
    fn test_turnover_budget_shrinks_last_action() {
        let engine = DecisionEngine::default();
        let constraints = Constraints {
            max_turnover_ratio: 0.3,
            ..wide_constraints()
        };
        let d = engine
            .decide(&snapshot(), &[sample(vec![0.9])], &universe(), &constraints)
            .unwrap();

        // budget 3,000,000: AAA 1,000,000 + BBB 2,000,000; CCC gets nothing
        let total: Decimal = d.actions.iter().map(|a| a.order_notional.abs()).sum();
        assert!(total <= dec!(3000000));
        assert_eq!(d.actions.len(), 2);
    }

    #[test]
    fn test_non_hold_count_bounded() {
        let engine = DecisionEngine::default();
        let constraints = Constraints {
            max_buy_candidates: 1,
            max_sell_candidates: 0,
            ..wide_constraints()
        };
        let d = engine
            .decide(&snapshot(), &[sample(vec![0.9])], &universe(), &constraints)
            .unwrap();
        assert!(d.active_actions().count() <= constraints.max_active_actions());
        assert_eq!(d.active_actions().count(), 1);
    }

    #[test]
    fn test_advisor_valid_payload_sized() {
        let engine = DecisionEngine::default();
        let payload = r#"{
            "global_view": {"macro_bias": "risk_on", "risk_action": "increase_exposure", "target_cash_ratio": 0.2},
            "ticker_decisions": [
                {"ticker": "BBB", "action": "BUY", "target_weight": 0.5, "priority": 1, "strength": 0.4, "reason": "a"},
                {"ticker": "CCC", "action": "BUY", "target_weight": 0.1, "priority": 2, "strength": 0.9, "reason": "b"},
                {"ticker": "AAA", "action": "SELL", "target_weight": 0.0, "priority": 3, "strength": 0.7, "reason": "c"}
            ]
        }"#;
        let d = engine
            .decide_from_advisor(&snapshot(), payload, &universe(), &wide_constraints())
            .unwrap();

        assert_eq!(d.bias, Bias::Advisor);
        assert_eq!(d.target_cash_ratio, 0.2);
        let tickers: Vec<&str> = d.actions.iter().map(|a| a.ticker.as_str()).collect();
        // sells first, then buys by strength
        assert_eq!(tickers, vec!["AAA", "CCC", "BBB"]);
        let bbb = &d.actions[2];
        assert_eq!(bbb.target_weight, 0.2);
        assert_eq!(d.actions[0].order_notional, dec!(-1000000));
    }

    #[test]
    fn test_advisor_invalid_payload_falls_back_to_hold() {
        let engine = DecisionEngine::default();
        let d = engine
            .decide_from_advisor(&snapshot(), "{\"ticker_decisions\": 5}", &universe(), &wide_constraints())
            .unwrap();
        assert!(d.is_all_hold());
        assert_eq!(d.target_cash_ratio, 0.5);
    }
}
