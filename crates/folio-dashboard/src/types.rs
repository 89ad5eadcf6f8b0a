//! Dashboard API types.
//!
//! These types are used for JSON serialization in REST and WebSocket APIs.

use chrono::{DateTime, Utc};
use folio_core::OutcomeStatus;
use folio_persistence::OutcomeRecord;
use serde::{Deserialize, Serialize};

/// Loop that ran a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleLoop {
    Decision,
    Risk,
}

impl CycleLoop {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Risk => "risk",
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Ran to the end; individual orders may still have failed.
    Completed,
    /// Stopped before dispatch, e.g. portfolio unavailable.
    Aborted,
    /// Outside market hours.
    Skipped,
}

/// One cycle's outcome list plus per-order status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub loop_name: CycleLoop,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: CycleStatus,
    /// Abort reason or summary.
    pub detail: Option<String>,
    pub records: Vec<OutcomeRecord>,
}

impl CycleReport {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.status == status)
            .count()
    }
}

/// Full dashboard state snapshot (sent on initial connection and via REST).
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    /// Timestamp when snapshot was taken (Unix milliseconds).
    pub timestamp_ms: i64,
    pub last_decision: Option<CycleReport>,
    pub last_risk: Option<CycleReport>,
}

/// WebSocket message types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    /// Full state, sent once on connect.
    Snapshot(DashboardSnapshot),
    /// A cycle just finished.
    CycleCompleted(CycleReport),
}
