//! Brokerage transaction seam.
//!
//! The state machine talks to the broker only through [`BrokerApi`], so the
//! live brokerage client, the in-process paper broker and test mocks are
//! interchangeable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use folio_core::{BoxFuture, CancelRequest, CancelableOrder, OrderMessage};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::SubmitError;

/// Broker acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub broker_order_id: String,
    /// Routing/branch reference needed for cancel-or-revise.
    pub routing_reference: String,
    /// Broker message, passed through to the outcome.
    pub message: String,
}

/// Brokerage transaction calls.
pub trait BrokerApi: Send + Sync {
    /// Submit one order. Acceptance is not a fill.
    fn submit<'a>(&'a self, order: &'a OrderMessage) -> BoxFuture<'a, Result<Submission, SubmitError>>;

    /// Cancel (or partially cancel) a pending order. Returns the broker message.
    fn cancel<'a>(&'a self, request: &'a CancelRequest) -> BoxFuture<'a, Result<String, SubmitError>>;

    /// Orders the broker still reports as cancelable.
    fn cancelable_orders(&self) -> BoxFuture<'_, Result<Vec<CancelableOrder>, SubmitError>>;

    /// Whether submissions can currently be made (credential available).
    fn is_ready(&self) -> BoxFuture<'_, bool>;
}

/// Arc wrapper for BrokerApi trait objects.
pub type DynBrokerApi = Arc<dyn BrokerApi>;

/// Mock broker for testing.
///
/// Submit results are taken from a queue; when the queue is empty every
/// submission is accepted with a sequential order id.
#[derive(Debug)]
pub struct MockBroker {
    submits: Mutex<Vec<OrderMessage>>,
    cancels: Mutex<Vec<CancelRequest>>,
    queued: Mutex<VecDeque<Result<Submission, SubmitError>>>,
    cancel_result: Mutex<Result<String, SubmitError>>,
    cancelable: Mutex<Vec<CancelableOrder>>,
    ready: AtomicBool,
    /// When set, each submission waits for one notification after recording.
    gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            submits: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            cancel_result: Mutex::new(Ok("cancelled".to_string())),
            cancelable: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
            gate: Mutex::new(None),
        }
    }

    /// Queue the result of the next submission.
    pub fn push_result(&self, result: Result<Submission, SubmitError>) {
        self.queued.lock().push_back(result);
    }

    pub fn set_cancel_result(&self, result: Result<String, SubmitError>) {
        *self.cancel_result.lock() = result;
    }

    pub fn set_cancelable(&self, orders: Vec<CancelableOrder>) {
        *self.cancelable.lock() = orders;
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Hold every submission until `gate` is notified.
    pub fn hold_submissions(&self, gate: Arc<Notify>) {
        *self.gate.lock() = Some(gate);
    }

    /// Recorded submissions.
    pub fn submits(&self) -> Vec<OrderMessage> {
        self.submits.lock().clone()
    }

    /// Recorded cancels.
    pub fn cancels(&self) -> Vec<CancelRequest> {
        self.cancels.lock().clone()
    }
}

impl BrokerApi for MockBroker {
    fn submit<'a>(&'a self, order: &'a OrderMessage) -> BoxFuture<'a, Result<Submission, SubmitError>> {
        Box::pin(async move {
            let seq = {
                let mut submits = self.submits.lock();
                submits.push(order.clone());
                submits.len()
            };
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.queued.lock().pop_front().unwrap_or_else(|| {
                Ok(Submission {
                    broker_order_id: format!("{seq:010}"),
                    routing_reference: "00950".to_string(),
                    message: "accepted".to_string(),
                })
            })
        })
    }

    fn cancel<'a>(&'a self, request: &'a CancelRequest) -> BoxFuture<'a, Result<String, SubmitError>> {
        Box::pin(async move {
            self.cancels.lock().push(request.clone());
            self.cancel_result.lock().clone()
        })
    }

    fn cancelable_orders(&self) -> BoxFuture<'_, Result<Vec<CancelableOrder>, SubmitError>> {
        Box::pin(async move { Ok(self.cancelable.lock().clone()) })
    }

    fn is_ready(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.ready.load(Ordering::SeqCst) })
    }
}
