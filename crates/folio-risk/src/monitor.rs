//! Risk monitor cycle.
//!
//! Each run reads a fresh portfolio snapshot, sells the full sellable
//! quantity of every position past a threshold through the shared order sink,
//! and picks the next interval from the market volume level.
//!
//! When the brokerage only has a cached (stale) snapshot, stop-loss exits
//! still fire; take-profit exits wait for current prices. Every exit is
//! confirmed against the live sellable quantity before the order goes out.

use std::time::Duration;

use folio_broker::DynAccountReader;
use folio_core::{OrderMessage, OrderOutcome, OrderSide};
use folio_telemetry::Metrics;
use folio_ws::DynOrderSink;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::error::{RiskError, RiskResult};
use crate::exits::{evaluate_exits, ExitCandidate, ExitTrigger};

/// One exit issued during a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ExitRecord {
    pub candidate: ExitCandidate,
    /// The order handed to the sink.
    pub order: OrderMessage,
    pub outcomes: Vec<OrderOutcome>,
}

/// Result of one risk cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub high_volume: bool,
    pub exits: Vec<ExitRecord>,
    /// Candidates skipped because nothing was sellable.
    pub skipped: Vec<ExitCandidate>,
    /// The cycle ran on a cached snapshot.
    pub stale_snapshot: bool,
    /// Take-profit candidates held back because the snapshot was stale.
    pub deferred: Vec<ExitCandidate>,
    #[serde(skip)]
    pub next_interval: Duration,
}

impl RiskReport {
    /// Every outcome produced in the cycle.
    pub fn outcomes(&self) -> impl Iterator<Item = &OrderOutcome> {
        self.exits.iter().flat_map(|e| e.outcomes.iter())
    }
}

/// Stop-loss / take-profit monitor.
pub struct RiskMonitor {
    config: RiskConfig,
    account: DynAccountReader,
    orders: DynOrderSink,
}

impl RiskMonitor {
    pub fn new(config: RiskConfig, account: DynAccountReader, orders: DynOrderSink) -> Self {
        Self {
            config,
            account,
            orders,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Whether market volume is elevated. Unknown counts as normal.
    pub async fn check_volume(&self) -> bool {
        match self.account.volume_ratio(&self.config.volume_ticker).await {
            Ok(ratio) => {
                let high = ratio >= self.config.volume_high_ratio;
                debug!(ratio, high, "Volume ratio checked");
                high
            }
            Err(e) => {
                warn!(error = %e, "Volume check failed, assuming normal volume");
                false
            }
        }
    }

    /// Run one cycle.
    ///
    /// A missing snapshot aborts the cycle without orders. A stale one only
    /// drives stop-loss exits.
    pub async fn run_cycle(&self) -> RiskResult<RiskReport> {
        let high_volume = self.check_volume().await;
        let next_interval = self.config.interval_for(high_volume);

        let snapshot = self
            .account
            .portfolio()
            .await
            .map_err(|e| RiskError::DataUnavailable(e.to_string()))?;
        let stale_snapshot = snapshot.data_stale;
        if stale_snapshot {
            warn!("Portfolio snapshot is stale, checking stop-loss only");
        }

        let mut exits = Vec::new();
        let mut skipped = Vec::new();
        let mut deferred = Vec::new();
        for candidate in evaluate_exits(&snapshot, &self.config) {
            if stale_snapshot && candidate.trigger != ExitTrigger::StopLoss {
                debug!(ticker = %candidate.ticker, "Take-profit deferred until prices are current");
                deferred.push(candidate);
                continue;
            }
            info!(
                ticker = %candidate.ticker,
                trigger = %candidate.trigger,
                profit_loss_rate = candidate.profit_loss_rate,
                "Exit threshold crossed"
            );

            let quantity = match self.account.sellable_quantity(&candidate.ticker).await {
                Ok(quantity) => quantity,
                Err(e) => {
                    warn!(ticker = %candidate.ticker, error = %e, "Sellable quantity unavailable, skipping exit");
                    skipped.push(candidate);
                    continue;
                }
            };
            if quantity == 0 {
                debug!(ticker = %candidate.ticker, "Nothing sellable, skipping exit");
                skipped.push(candidate);
                continue;
            }

            let order = OrderMessage::market(OrderSide::Sell, candidate.ticker.clone(), quantity);
            let outcomes = self.orders.send(&order).await;
            Metrics::risk_exit(candidate.trigger.as_str());
            exits.push(ExitRecord {
                candidate,
                order,
                outcomes,
            });
        }

        Ok(RiskReport {
            high_volume,
            exits,
            skipped,
            stale_snapshot,
            deferred,
            next_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_broker::MockAccountReader;
    use folio_core::{PortfolioSnapshot, Position};
    use folio_ws::MockOrderSink;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn position(ticker: &str, rate: f64) -> Position {
        let mut p = Position::new(ticker, "", 10, dec!(10000), dec!(10000), dec!(100000), dec!(1000000));
        p.profit_loss_rate = rate;
        p
    }

    fn setup(positions: Vec<Position>) -> (RiskMonitor, Arc<MockAccountReader>, Arc<MockOrderSink>) {
        let account = Arc::new(MockAccountReader::new());
        account.set_snapshot(Some(PortfolioSnapshot::new(dec!(500000), dec!(1000000), positions)));
        let sink = Arc::new(MockOrderSink::new());
        let monitor = RiskMonitor::new(RiskConfig::default(), account.clone(), sink.clone());
        (monitor, account, sink)
    }

    #[tokio::test]
    async fn test_stop_loss_sells_full_sellable_quantity() {
        let (monitor, account, sink) = setup(vec![position("AAA", -0.06), position("BBB", 0.01)]);
        account.set_sellable("AAA", 7);

        let report = monitor.run_cycle().await.unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].ticker, "AAA");
        assert_eq!(sent[0].kind, OrderSide::Sell);
        assert_eq!(sent[0].quantity, 7);
        assert_eq!(report.exits[0].candidate.trigger, ExitTrigger::StopLoss);
        assert_eq!(report.outcomes().count(), 1);
    }

    #[tokio::test]
    async fn test_nothing_sellable_is_skipped() {
        let (monitor, _account, sink) = setup(vec![position("AAA", 0.3)]);

        let report = monitor.run_cycle().await.unwrap();

        assert!(sink.sent().is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_snapshot_still_stops_losses() {
        let (monitor, account, sink) = setup(vec![]);
        let stale = PortfolioSnapshot::new(
            dec!(0),
            dec!(1000000),
            vec![position("AAA", -0.06), position("BBB", 0.3)],
        )
        .as_stale();
        account.set_snapshot(Some(stale));
        account.set_sellable("AAA", 10);
        account.set_sellable("BBB", 4);

        let report = monitor.run_cycle().await.unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].ticker, "AAA");
        assert_eq!(sent[0].quantity, 10);
        assert!(report.stale_snapshot);
        assert_eq!(report.deferred.len(), 1);
        assert_eq!(report.deferred[0].ticker, "BBB");
        assert_eq!(report.exits[0].order.request_id, sent[0].request_id);
    }

    #[tokio::test]
    async fn test_stale_stop_loss_confirms_sellable_quantity() {
        let (monitor, account, sink) = setup(vec![]);
        let stale = PortfolioSnapshot::new(dec!(0), dec!(1000000), vec![position("AAA", -0.2)]).as_stale();
        account.set_snapshot(Some(stale));

        let report = monitor.run_cycle().await.unwrap();

        assert!(sink.sent().is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_snapshot_aborts_cycle() {
        let (monitor, account, sink) = setup(vec![]);
        account.set_snapshot(None);

        assert!(matches!(monitor.run_cycle().await, Err(RiskError::DataUnavailable(_))));
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_read_every_cycle() {
        let (monitor, account, _sink) = setup(vec![]);
        monitor.run_cycle().await.unwrap();
        monitor.run_cycle().await.unwrap();
        assert_eq!(account.portfolio_reads(), 2);
    }

    #[tokio::test]
    async fn test_volume_selects_interval() {
        let (monitor, account, _sink) = setup(vec![]);

        account.set_volume_ratio(1.6);
        let busy = monitor.run_cycle().await.unwrap();
        assert!(busy.high_volume);
        assert_eq!(busy.next_interval, Duration::from_secs(300));

        account.set_volume_ratio(0.8);
        let quiet = monitor.run_cycle().await.unwrap();
        assert_eq!(quiet.next_interval, Duration::from_secs(600));
    }
}
