//! Dashboard state management.
//!
//! Holds the last report of each loop and fans finished cycles out to
//! WebSocket clients. The manual decision trigger is a bounded channel owned
//! by the decision loop. An optional account reader backs the live
//! portfolio and buyable-cash views.

use std::sync::Arc;

use chrono::Utc;
use folio_broker::DynAccountReader;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use crate::types::{CycleLoop, CycleReport, DashboardMessage, DashboardSnapshot};

/// Result of a manual trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    Queued,
    /// A trigger is already waiting to be picked up.
    AlreadyQueued,
    /// No decision loop is listening.
    Unavailable,
}

/// Shared dashboard state.
#[derive(Clone)]
pub struct DashboardState {
    last_decision: Arc<RwLock<Option<CycleReport>>>,
    last_risk: Arc<RwLock<Option<CycleReport>>>,
    updates: broadcast::Sender<String>,
    trigger: Option<mpsc::Sender<()>>,
    account: Option<DynAccountReader>,
}

impl DashboardState {
    /// State without a manual trigger.
    pub fn new() -> Self {
        // Cycles finish minutes apart, a small buffer is plenty
        let (updates, _) = broadcast::channel(16);
        Self {
            last_decision: Arc::new(RwLock::new(None)),
            last_risk: Arc::new(RwLock::new(None)),
            updates,
            trigger: None,
            account: None,
        }
    }

    /// State with a manual decision trigger; returns the receiver for the loop.
    pub fn with_trigger() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let mut state = Self::new();
        state.trigger = Some(tx);
        (state, rx)
    }

    /// Serve live account views from `reader`.
    #[must_use]
    pub fn with_account(mut self, reader: DynAccountReader) -> Self {
        self.account = Some(reader);
        self
    }

    pub fn account(&self) -> Option<&DynAccountReader> {
        self.account.as_ref()
    }

    /// Store a finished cycle and push it to connected clients.
    pub fn record_cycle(&self, report: CycleReport) {
        let slot = match report.loop_name {
            CycleLoop::Decision => &self.last_decision,
            CycleLoop::Risk => &self.last_risk,
        };
        *slot.write() = Some(report.clone());

        match serde_json::to_string(&DashboardMessage::CycleCompleted(report)) {
            Ok(json) => match self.updates.send(json) {
                Ok(n) => trace!(receivers = n, "Cycle update broadcast"),
                Err(_) => trace!("No WebSocket receivers connected"),
            },
            Err(e) => debug!(error = %e, "Failed to serialize cycle update"),
        }
    }

    pub fn last_cycle(&self, loop_name: CycleLoop) -> Option<CycleReport> {
        match loop_name {
            CycleLoop::Decision => self.last_decision.read().clone(),
            CycleLoop::Risk => self.last_risk.read().clone(),
        }
    }

    pub fn collect_snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            last_decision: self.last_cycle(CycleLoop::Decision),
            last_risk: self.last_cycle(CycleLoop::Risk),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.updates.subscribe()
    }

    /// Ask the decision loop for an immediate cycle.
    pub fn request_decision(&self) -> TriggerResult {
        let Some(trigger) = &self.trigger else {
            return TriggerResult::Unavailable;
        };
        match trigger.try_send(()) {
            Ok(()) => TriggerResult::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => TriggerResult::AlreadyQueued,
            Err(mpsc::error::TrySendError::Closed(_)) => TriggerResult::Unavailable,
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CycleStatus;

    fn report(loop_name: CycleLoop) -> CycleReport {
        CycleReport {
            cycle_id: "c-1".to_string(),
            loop_name,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            status: CycleStatus::Completed,
            detail: None,
            records: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_record_cycle_keeps_latest_per_loop() {
        let state = DashboardState::new();
        let mut rx = state.subscribe();

        state.record_cycle(report(CycleLoop::Risk));

        let snapshot = state.collect_snapshot();
        assert!(snapshot.last_decision.is_none());
        assert_eq!(snapshot.last_risk.unwrap().cycle_id, "c-1");

        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "cycle_completed");
        assert_eq!(msg["loop_name"], "risk");
    }

    #[test]
    fn test_trigger_is_bounded() {
        let (state, mut rx) = DashboardState::with_trigger();
        assert_eq!(state.request_decision(), TriggerResult::Queued);
        assert_eq!(state.request_decision(), TriggerResult::AlreadyQueued);
        assert!(rx.try_recv().is_ok());
        assert_eq!(state.request_decision(), TriggerResult::Queued);

        drop(rx);
        assert_eq!(state.request_decision(), TriggerResult::Unavailable);
        assert_eq!(DashboardState::new().request_decision(), TriggerResult::Unavailable);
    }
}
