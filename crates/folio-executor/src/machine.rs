//! Execution state machine.
//!
//! Per order: `received -> submitting -> pending`, or a terminal `rejected` /
//! `failed_to_submit` without a pending record. Pending orders leave the book
//! on confirmed cancellation.
//!
//! # Idempotency
//!
//! Accepted outcomes are remembered by `request_id`. A resend of an accepted
//! order returns the remembered outcome and never creates a second pending
//! record. While an order is still being submitted, a concurrent resend gets a
//! `pending` outcome instead of a second broker call.
//!
//! Settled requests (terminal state, or accepted longer ago than
//! `retention_secs`) are evicted, so a resend is only deduplicated inside the
//! retention window.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use folio_core::{
    CancelRequest, CancelResult, CancelableOrder, OrderMessage, OrderOutcome, OrderSide,
    OrderState, PendingOrder, RequestId,
};
use folio_telemetry::Metrics;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::broker_api::{DynBrokerApi, Submission};
use crate::error::SubmitError;
use crate::limits::OrderLimits;

/// Submission retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Total submission attempts for transport failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How long settled requests are remembered for deduplication.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_retention_secs() -> u64 {
    86_400
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            retention_secs: default_retention_secs(),
        }
    }
}

/// Decode an inbound order payload.
///
/// An unknown order kind is reported as `Invalid action: <kind>`; any other
/// schema problem is reported with the decoder's message. Both keep the
/// payload's `request_id` when it has one.
pub fn parse_order(mut value: Value) -> Result<OrderMessage, OrderOutcome> {
    let request_id = value
        .get("request_id")
        .and_then(Value::as_str)
        .map(RequestId::from)
        .unwrap_or_else(RequestId::unknown);

    let kind_key = if value.get("kind").is_some() { "kind" } else { "action" };
    let kind = value
        .get(kind_key)
        .map(|raw| raw.as_str().map_or_else(|| raw.to_string(), str::to_string));
    if let Some(raw) = kind {
        match OrderSide::parse(&raw.to_lowercase()) {
            Some(side) => value[kind_key] = Value::String(side.to_string()),
            None => {
                return Err(OrderOutcome::failed(request_id, format!("Invalid action: {raw}")));
            }
        }
    }

    serde_json::from_value(value)
        .map_err(|e| OrderOutcome::failed(request_id, format!("Invalid order: {e}")))
}

/// Lifecycle state and when it was entered.
#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: OrderState,
    since: DateTime<Utc>,
}

impl Tracked {
    fn new(state: OrderState) -> Self {
        Self {
            state,
            since: Utc::now(),
        }
    }
}

/// Order lifecycle owner for the execution service.
pub struct ExecutionStateMachine {
    broker: DynBrokerApi,
    limits: OrderLimits,
    config: ExecutorConfig,
    /// Lifecycle state by request id.
    states: DashMap<RequestId, Tracked>,
    /// Outcome of every accepted order.
    accepted: DashMap<RequestId, OrderOutcome>,
    /// Pending book keyed by broker order id. Single writer per update,
    /// readers see a consistent snapshot.
    pending: RwLock<HashMap<String, PendingOrder>>,
}

impl ExecutionStateMachine {
    pub fn new(broker: DynBrokerApi, limits: OrderLimits, config: ExecutorConfig) -> Self {
        Self {
            broker,
            limits,
            config,
            states: DashMap::new(),
            accepted: DashMap::new(),
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Current lifecycle state of `request_id`.
    pub fn state(&self, request_id: &RequestId) -> Option<OrderState> {
        self.states.get(request_id).map(|t| t.state)
    }

    /// Number of request ids currently remembered.
    pub fn tracked_requests(&self) -> usize {
        self.states.len().max(self.accepted.len())
    }

    /// Forget requests settled before `now - retention_secs`.
    ///
    /// Terminal states are dropped by the time they were entered; accepted
    /// outcomes by their decision time, together with their lifecycle entry
    /// unless a submission is in flight. Returns the number of ids forgotten.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        // Clamped to ten years, well inside chrono's range.
        let retention =
            chrono::Duration::seconds(self.config.retention_secs.min(315_360_000) as i64);
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return 0;
        };

        let expired: Vec<RequestId> = self
            .accepted
            .iter()
            .filter(|e| e.value().decided_at < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for id in &expired {
            self.accepted.remove(id);
            self.states.remove_if(id, |_, t| {
                !matches!(t.state, OrderState::Received | OrderState::Submitting)
            });
        }

        let before = self.states.len();
        self.states.retain(|id, t| {
            !(t.state.is_terminal() && t.since < cutoff && !self.accepted.contains_key(id))
        });
        let dropped_states = before - self.states.len();

        let forgotten = expired.len() + dropped_states;
        if forgotten > 0 {
            debug!(forgotten, "Pruned settled requests");
        }
        forgotten
    }

    /// Snapshot of the pending book, oldest first.
    pub fn pending_orders(&self) -> Vec<PendingOrder> {
        let mut orders: Vec<PendingOrder> = self.pending.read().values().cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    pub async fn is_ready(&self) -> bool {
        self.broker.is_ready().await
    }

    /// Run one order through its lifecycle and return its single outcome.
    pub async fn execute(&self, order: &OrderMessage) -> OrderOutcome {
        self.prune(Utc::now());

        if let Some(previous) = self.accepted.get(&order.request_id) {
            info!(request_id = %order.request_id, "Duplicate request, returning recorded outcome");
            return previous.clone();
        }

        match self.states.entry(order.request_id.clone()) {
            Entry::Occupied(entry) if !entry.get().state.is_terminal() => {
                warn!(request_id = %order.request_id, state = ?entry.get().state, "Order already in progress");
                return OrderOutcome::pending(order.request_id.clone(), "Order already in progress");
            }
            Entry::Occupied(mut entry) => {
                entry.insert(Tracked::new(OrderState::Received));
            }
            Entry::Vacant(entry) => {
                entry.insert(Tracked::new(OrderState::Received));
            }
        }

        info!(
            request_id = %order.request_id,
            kind = %order.kind,
            ticker = %order.ticker,
            quantity = order.quantity,
            style = %order.order_style,
            "Order received"
        );

        if let Some(outcome) = self.limits.enforce(order) {
            self.transition(&order.request_id, OrderState::Rejected);
            return outcome;
        }

        self.transition(&order.request_id, OrderState::Submitting);
        match self.submit_with_retry(order).await {
            Ok(submission) => self.accept(order, submission),
            Err(e) => {
                let (state, message) = match &e {
                    SubmitError::Transport(_) => (
                        OrderState::FailedToSubmit,
                        format!("Order failed after {} attempts: {e}", self.config.max_attempts.max(1)),
                    ),
                    SubmitError::Business(_) | SubmitError::Credential(_) => {
                        (OrderState::Rejected, e.to_string())
                    }
                };
                error!(request_id = %order.request_id, ?state, %message, "Order not accepted");
                self.transition(&order.request_id, state);
                OrderOutcome::failed(order.request_id.clone(), message)
            }
        }
    }

    async fn submit_with_retry(&self, order: &OrderMessage) -> Result<Submission, SubmitError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.broker.submit(order).await {
                Ok(submission) => {
                    Metrics::broker_submit("accepted");
                    return Ok(submission);
                }
                Err(e) => {
                    Metrics::broker_submit(match &e {
                        SubmitError::Transport(_) => "transport_error",
                        SubmitError::Business(_) => "rejected",
                        SubmitError::Credential(_) => "credential_error",
                    });
                    if !e.is_retryable() || attempt >= attempts {
                        return Err(e);
                    }
                    warn!(
                        request_id = %order.request_id,
                        attempt,
                        error = %e,
                        "Submission failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    fn accept(&self, order: &OrderMessage, submission: Submission) -> OrderOutcome {
        let record = PendingOrder {
            broker_order_id: submission.broker_order_id.clone(),
            request_id: order.request_id.clone(),
            ticker: order.ticker.clone(),
            kind: order.kind,
            quantity: order.quantity,
            routing_reference: submission.routing_reference,
            created_at: Utc::now(),
        };
        self.pending
            .write()
            .insert(submission.broker_order_id.clone(), record);

        let outcome = OrderOutcome::success(
            order.request_id.clone(),
            submission.broker_order_id.clone(),
            submission.message,
        );
        self.accepted.insert(order.request_id.clone(), outcome.clone());
        self.transition(&order.request_id, OrderState::Pending);

        info!(
            request_id = %order.request_id,
            broker_order_id = %submission.broker_order_id,
            "Order accepted"
        );
        outcome
    }

    /// Cancel or partially cancel a pending order.
    ///
    /// On success the pending record is removed. A routing reference missing
    /// from the request is filled from the pending book.
    pub async fn cancel(&self, request: &CancelRequest) -> CancelResult {
        let mut request = request.clone();
        let known = self.pending.read().get(&request.broker_order_id).cloned();
        if request.routing_reference.is_empty() {
            if let Some(record) = &known {
                request.routing_reference = record.routing_reference.clone();
            }
        }

        match self.broker.cancel(&request).await {
            Ok(message) => {
                if let Some(record) = self.pending.write().remove(&request.broker_order_id) {
                    self.transition(&record.request_id, OrderState::Cancelled);
                }
                info!(broker_order_id = %request.broker_order_id, "Order cancelled");
                CancelResult::success(message)
            }
            Err(e) => {
                warn!(broker_order_id = %request.broker_order_id, error = %e, "Cancel failed");
                CancelResult::failed(e.to_string())
            }
        }
    }

    /// Orders the broker reports as cancelable. Empty on failure.
    pub async fn cancelable_orders(&self) -> Vec<CancelableOrder> {
        match self.broker.cancelable_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Failed to get cancelable orders");
                Vec::new()
            }
        }
    }

    /// Record a confirmed fill and drop the pending record.
    pub fn mark_filled(&self, broker_order_id: &str) -> Option<PendingOrder> {
        let record = self.pending.write().remove(broker_order_id)?;
        self.transition(&record.request_id, OrderState::Filled);
        Some(record)
    }

    fn transition(&self, request_id: &RequestId, next: OrderState) {
        if let Some(mut tracked) = self.states.get_mut(request_id) {
            if !tracked.state.can_transition_to(next) {
                debug!(%request_id, from = ?tracked.state, to = ?next, "Unexpected order transition");
            }
            *tracked = Tracked::new(next);
        }
    }
}
