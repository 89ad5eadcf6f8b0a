//! One decision cycle and one risk cycle, end to end.
//!
//! A cycle never returns an error to its loop: failures become an `Aborted`
//! report. Every dispatched order ends up in the journal and in the report.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use folio_broker::{DynAccountReader, DynAdvisorSource, DynCandidateSource, DynSignalSource};
use folio_core::{
    AggregatedSignal, Constraints, OrderMessage, OrderOutcome, PortfolioSnapshot,
};
use folio_dashboard::{CycleLoop, CycleReport, CycleStatus, DashboardState};
use folio_decision::{Decision, DecisionEngine, DecisionSource, UniverseEntry};
use folio_persistence::{OrderOrigin, OutcomeJournal, OutcomeRecord};
use folio_risk::{RiskError, RiskMonitor};
use folio_telemetry::Metrics;
use folio_ws::DynOrderSink;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Journal and dashboard sink for finished cycles.
#[derive(Clone)]
pub struct CycleRecorder {
    journal: Option<Arc<Mutex<OutcomeJournal>>>,
    dashboard: DashboardState,
}

impl CycleRecorder {
    pub fn new(journal: Option<OutcomeJournal>, dashboard: DashboardState) -> Self {
        Self {
            journal: journal.map(|j| Arc::new(Mutex::new(j))),
            dashboard,
        }
    }

    pub fn dashboard(&self) -> &DashboardState {
        &self.dashboard
    }

    /// Journal the report's outcomes and publish it.
    pub fn finish(&self, report: CycleReport) {
        let result = match report.status {
            CycleStatus::Completed => "ok",
            CycleStatus::Aborted => "error",
            CycleStatus::Skipped => "skipped",
        };
        Metrics::cycle_run(report.loop_name.as_str(), result);

        if let Some(journal) = &self.journal {
            let mut journal = journal.lock();
            for record in &report.records {
                if let Err(e) = journal.append(record.clone()) {
                    error!(
                        request_id = %record.outcome.request_id,
                        error = %e,
                        "Failed to journal outcome"
                    );
                }
            }
        }

        info!(
            cycle_id = %report.cycle_id,
            loop_name = report.loop_name.as_str(),
            status = ?report.status,
            orders = report.records.len(),
            "Cycle finished"
        );
        self.dashboard.record_cycle(report);
    }

    /// Flush and close the journal.
    pub fn close(&self) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.lock().close() {
                warn!(error = %e, "Failed to close outcome journal");
            }
        }
    }
}

/// Records for an order's outcomes; a follow-up is described by the
/// suggestion it was built from.
fn records_for(
    cycle_id: &str,
    origin: OrderOrigin,
    order: &OrderMessage,
    outcomes: Vec<OrderOutcome>,
) -> Vec<OutcomeRecord> {
    let suggestion = outcomes.first().and_then(|o| o.next_action.clone());
    outcomes
        .into_iter()
        .enumerate()
        .map(|(i, outcome)| {
            let source = match (&suggestion, i) {
                (Some(next), i) if i > 0 => next.as_ref(),
                _ => order,
            };
            OutcomeRecord::new(cycle_id, origin, source, outcome)
        })
        .collect()
}

fn new_cycle_id(loop_name: CycleLoop) -> String {
    format!("{}-{}", loop_name.as_str(), Uuid::new_v4().simple())
}

fn report(
    cycle_id: String,
    loop_name: CycleLoop,
    started_at: DateTime<Utc>,
    status: CycleStatus,
    detail: Option<String>,
    records: Vec<OutcomeRecord>,
) -> CycleReport {
    CycleReport {
        cycle_id,
        loop_name,
        started_at,
        finished_at: Utc::now(),
        status,
        detail,
        records,
    }
}

/// Report for a cycle skipped outside market hours.
pub fn skipped_report(loop_name: CycleLoop) -> CycleReport {
    let started = Utc::now();
    report(
        new_cycle_id(loop_name),
        loop_name,
        started,
        CycleStatus::Skipped,
        Some("market closed".to_string()),
        Vec::new(),
    )
}

/// Decision cycle collaborators.
pub struct DecisionCycle {
    engine: DecisionEngine,
    constraints: Constraints,
    account: DynAccountReader,
    signals: DynSignalSource,
    candidates: Option<DynCandidateSource>,
    advisor: Option<DynAdvisorSource>,
    orders: DynOrderSink,
}

impl DecisionCycle {
    pub fn new(
        engine: DecisionEngine,
        constraints: Constraints,
        account: DynAccountReader,
        signals: DynSignalSource,
        orders: DynOrderSink,
    ) -> Self {
        Self {
            engine,
            constraints,
            account,
            signals,
            candidates: None,
            advisor: None,
            orders,
        }
    }

    #[must_use]
    pub fn with_candidates(mut self, candidates: DynCandidateSource) -> Self {
        self.candidates = Some(candidates);
        self
    }

    #[must_use]
    pub fn with_advisor(mut self, advisor: DynAdvisorSource) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Holdings at their portfolio price, then priced external candidates.
    pub async fn build_universe(&self, snapshot: &PortfolioSnapshot) -> Vec<UniverseEntry> {
        let mut universe: Vec<UniverseEntry> = snapshot
            .positions
            .iter()
            .map(|p| UniverseEntry {
                ticker: p.ticker.clone(),
                name: p.name.clone(),
                current_price: p.current_price,
                held: true,
            })
            .collect();

        let Some(source) = &self.candidates else {
            return universe;
        };
        for candidate in source.candidates().await {
            if universe.iter().any(|u| u.ticker == candidate.ticker) {
                continue;
            }
            match source.price(&candidate.ticker).await {
                Ok(price) if price > rust_decimal::Decimal::ZERO => universe.push(UniverseEntry {
                    ticker: candidate.ticker,
                    name: candidate.name,
                    current_price: price,
                    held: false,
                }),
                Ok(_) => warn!(ticker = %candidate.ticker, "Candidate has no price, skipping"),
                Err(e) => warn!(ticker = %candidate.ticker, error = %e, "Candidate price unavailable"),
            }
        }
        universe
    }

    async fn decide(
        &self,
        snapshot: &PortfolioSnapshot,
        samples: &[folio_core::SignalSample],
        universe: &[UniverseEntry],
    ) -> folio_decision::DecisionResult<Decision> {
        let advisor = match (self.engine.config().source, &self.advisor) {
            (DecisionSource::Advisor, Some(advisor)) => advisor,
            (DecisionSource::Advisor, None) => {
                warn!("Advisor source configured without an advisor, using signals");
                return self.engine.decide(snapshot, samples, universe, &self.constraints);
            }
            (DecisionSource::Signals, _) => {
                return self.engine.decide(snapshot, samples, universe, &self.constraints);
            }
        };

        let context = json!({
            "portfolio": snapshot,
            "universe": universe,
            "signal": AggregatedSignal::from_samples(samples),
        });
        match advisor.advise(context).await {
            Ok(raw) => self
                .engine
                .decide_from_advisor(snapshot, &raw, universe, &self.constraints),
            Err(e) => {
                warn!(error = %e, "Advisor unavailable, holding everything");
                self.engine.decide(snapshot, &[], universe, &self.constraints)
            }
        }
    }

    /// Run one cycle. Orders not yet sent when `shutdown` fires are recorded
    /// as failed without touching the channel.
    pub async fn run(&self, shutdown: &CancellationToken) -> CycleReport {
        let loop_name = CycleLoop::Decision;
        let cycle_id = new_cycle_id(loop_name);
        let started = Utc::now();
        info!(cycle_id = %cycle_id, "Decision cycle started");

        let (snapshot, samples) = tokio::join!(self.account.portfolio(), self.signals.collect());
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(cycle_id = %cycle_id, error = %e, "Portfolio unavailable, aborting cycle");
                return report(
                    cycle_id,
                    loop_name,
                    started,
                    CycleStatus::Aborted,
                    Some(format!("portfolio unavailable: {e}")),
                    Vec::new(),
                );
            }
        };

        let universe = self.build_universe(&snapshot).await;
        let decision = match self.decide(&snapshot, &samples, &universe).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(cycle_id = %cycle_id, error = %e, "Decision aborted");
                return report(
                    cycle_id,
                    loop_name,
                    started,
                    CycleStatus::Aborted,
                    Some(e.to_string()),
                    Vec::new(),
                );
            }
        };
        info!(
            cycle_id = %cycle_id,
            bias = ?decision.bias,
            actions = decision.active_actions().count(),
            target_cash_ratio = decision.target_cash_ratio,
            "Decision made"
        );

        let plan = crate::planner::plan_orders(&decision.actions, self.account.as_ref()).await;

        let mut records = Vec::new();
        for order in &plan.orders {
            let outcomes = if shutdown.is_cancelled() {
                vec![OrderOutcome::failed(
                    order.request_id.clone(),
                    "not dispatched: shutting down",
                )]
            } else {
                self.orders.send(order).await
            };
            records.extend(records_for(&cycle_id, OrderOrigin::Decision, order, outcomes));
        }

        let detail = format!(
            "bias={:?} orders={} skipped={} {}",
            decision.bias,
            plan.orders.len(),
            plan.skipped.len(),
            decision.comment
        );
        report(
            cycle_id,
            loop_name,
            started,
            CycleStatus::Completed,
            Some(detail.trim_end().to_string()),
            records,
        )
    }
}

/// Run one risk cycle; returns the report and the delay before the next one.
pub async fn run_risk_cycle(monitor: &RiskMonitor) -> (CycleReport, Duration) {
    let loop_name = CycleLoop::Risk;
    let cycle_id = new_cycle_id(loop_name);
    let started = Utc::now();

    match monitor.run_cycle().await {
        Ok(risk) => {
            let records = risk
                .exits
                .iter()
                .flat_map(|exit| {
                    records_for(&cycle_id, OrderOrigin::Risk, &exit.order, exit.outcomes.clone())
                })
                .collect();
            let detail = format!(
                "high_volume={} stale={} exits={} skipped={} deferred={}",
                risk.high_volume,
                risk.stale_snapshot,
                risk.exits.len(),
                risk.skipped.len(),
                risk.deferred.len()
            );
            (
                report(cycle_id, loop_name, started, CycleStatus::Completed, Some(detail), records),
                risk.next_interval,
            )
        }
        Err(e) => {
            if matches!(e, RiskError::DataUnavailable(_)) {
                warn!(cycle_id = %cycle_id, error = %e, "Risk cycle aborted");
            } else {
                error!(cycle_id = %cycle_id, error = %e, "Risk cycle failed");
            }
            (
                report(
                    cycle_id,
                    loop_name,
                    started,
                    CycleStatus::Aborted,
                    Some(e.to_string()),
                    Vec::new(),
                ),
                monitor.config().interval_for(false),
            )
        }
    }
}
