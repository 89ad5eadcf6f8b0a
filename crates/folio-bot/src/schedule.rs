//! Decision and risk loops.
//!
//! Both loops are market-hours gated, stop at the next wait point once
//! shutdown is requested, and never cancel a cycle that is already running.
//! A failed cycle never ends its loop: a run of aborted cycles raises an
//! error-level alert (and the `folio_loop_failure_streak` gauge) on every
//! further failure while the loop keeps its schedule.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use folio_core::{Clock, MarketHours};
use folio_dashboard::{CycleLoop, CycleReport, CycleStatus};
use folio_risk::RiskMonitor;
use folio_telemetry::Metrics;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ScheduleConfig;
use crate::cycle::{run_risk_cycle, skipped_report, CycleRecorder, DecisionCycle};
use crate::error::AppResult;

/// Counts consecutive aborted cycles, shared across loop restarts.
#[derive(Debug, Clone)]
struct FailureStreak {
    loop_name: &'static str,
    alert_after: u32,
    count: Arc<AtomicU32>,
}

impl FailureStreak {
    fn new(loop_name: &'static str, alert_after: u32) -> Self {
        Self {
            loop_name,
            alert_after: alert_after.max(1),
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    fn current(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    fn observe(&self, report: &CycleReport) {
        let count = if report.status == CycleStatus::Aborted {
            self.count.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.count.store(0, Ordering::Relaxed);
            0
        };
        Metrics::loop_failure_streak(self.loop_name, count);

        if count >= self.alert_after {
            error!(
                loop_name = self.loop_name,
                failures = count,
                last_error = report.detail.as_deref().unwrap_or_default(),
                alert = true,
                "Loop keeps failing, still running on schedule"
            );
        }
    }
}

/// Periodic decision loop with an optional manual trigger.
#[derive(Clone)]
pub struct DecisionLoop {
    cycle: Arc<DecisionCycle>,
    recorder: CycleRecorder,
    schedule: ScheduleConfig,
    clock: Arc<dyn Clock>,
    trigger: Option<Arc<TokioMutex<mpsc::Receiver<()>>>>,
    failures: FailureStreak,
}

impl DecisionLoop {
    pub fn new(
        cycle: Arc<DecisionCycle>,
        recorder: CycleRecorder,
        schedule: ScheduleConfig,
        clock: Arc<dyn Clock>,
        alert_after_failures: u32,
    ) -> Self {
        Self {
            cycle,
            recorder,
            schedule,
            clock,
            trigger: None,
            failures: FailureStreak::new("decision", alert_after_failures),
        }
    }

    /// Consecutive aborted cycles so far.
    pub fn failure_streak(&self) -> u32 {
        self.failures.current()
    }

    /// Accept manual triggers from `rx`.
    #[must_use]
    pub fn with_trigger(mut self, rx: mpsc::Receiver<()>) -> Self {
        self.trigger = Some(Arc::new(TokioMutex::new(rx)));
        self
    }

    async fn next_trigger(&self) {
        match &self.trigger {
            Some(rx) => {
                if rx.lock().await.recv().await.is_none() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> AppResult<()> {
        let interval = self.schedule.decision_interval();
        let mut first = self.schedule.run_on_start;
        info!(interval_secs = interval.as_secs(), "Decision loop started");

        loop {
            let mut manual = false;
            if !first {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(interval) => {}
                    _ = self.next_trigger() => manual = true,
                }
            }
            first = false;
            if shutdown.is_cancelled() {
                return Ok(());
            }

            if !self.schedule.market_hours.is_open(self.clock.as_ref()) {
                debug!(manual, "Market closed, decision cycle skipped");
                if manual {
                    self.recorder.finish(skipped_report(CycleLoop::Decision));
                } else {
                    Metrics::cycle_run("decision", "skipped");
                }
                continue;
            }

            let report = self.cycle.run(&shutdown).await;
            self.failures.observe(&report);
            self.recorder.finish(report);
        }
    }
}

/// Volume-adaptive risk loop.
#[derive(Clone)]
pub struct RiskLoop {
    monitor: Arc<RiskMonitor>,
    recorder: CycleRecorder,
    market_hours: MarketHours,
    clock: Arc<dyn Clock>,
    failures: FailureStreak,
}

impl RiskLoop {
    pub fn new(
        monitor: Arc<RiskMonitor>,
        recorder: CycleRecorder,
        market_hours: MarketHours,
        clock: Arc<dyn Clock>,
        alert_after_failures: u32,
    ) -> Self {
        Self {
            monitor,
            recorder,
            market_hours,
            clock,
            failures: FailureStreak::new("risk", alert_after_failures),
        }
    }

    /// Consecutive aborted cycles so far.
    pub fn failure_streak(&self) -> u32 {
        self.failures.current()
    }

    pub async fn run(&self, shutdown: CancellationToken) -> AppResult<()> {
        let mut delay = Duration::ZERO;
        info!("Risk loop started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }

            if !self.market_hours.is_open(self.clock.as_ref()) {
                debug!("Market closed, risk cycle skipped");
                Metrics::cycle_run("risk", "skipped");
                delay = self.monitor.config().interval_for(false);
                continue;
            }

            let (report, next) = run_risk_cycle(&self.monitor).await;
            self.failures.observe(&report);
            self.recorder.finish(report);
            debug!(next_secs = next.as_secs(), "Next risk cycle scheduled");
            delay = next;
        }
    }
}
