//! Order sink seam used by the decision and risk loops.

use std::sync::Arc;

use folio_core::{BoxFuture, OrderMessage, OrderOutcome};
use parking_lot::Mutex;

use crate::dispatcher::OrderDispatcher;

/// Something that takes an order and reports its outcomes.
///
/// The outcome list holds the order's own outcome first, followed by the
/// outcome of any suggested follow-up.
pub trait OrderSink: Send + Sync {
    fn send<'a>(&'a self, order: &'a OrderMessage) -> BoxFuture<'a, Vec<OrderOutcome>>;
}

/// Arc wrapper for OrderSink trait objects.
pub type DynOrderSink = Arc<dyn OrderSink>;

impl OrderSink for OrderDispatcher {
    fn send<'a>(&'a self, order: &'a OrderMessage) -> BoxFuture<'a, Vec<OrderOutcome>> {
        Box::pin(self.dispatch_with_follow_up(order))
    }
}

/// Records orders and accepts each one, for testing.
#[derive(Debug, Default)]
pub struct MockOrderSink {
    sent: Mutex<Vec<OrderMessage>>,
    reject: Mutex<bool>,
}

impl MockOrderSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every following order instead of accepting it.
    pub fn set_reject(&self, reject: bool) {
        *self.reject.lock() = reject;
    }

    pub fn sent(&self) -> Vec<OrderMessage> {
        self.sent.lock().clone()
    }
}

impl OrderSink for MockOrderSink {
    fn send<'a>(&'a self, order: &'a OrderMessage) -> BoxFuture<'a, Vec<OrderOutcome>> {
        Box::pin(async move {
            let seq = {
                let mut sent = self.sent.lock();
                sent.push(order.clone());
                sent.len()
            };
            let outcome = if *self.reject.lock() {
                OrderOutcome::failed(order.request_id.clone(), "rejected by mock")
            } else {
                OrderOutcome::success(order.request_id.clone(), format!("{seq:010}"), "accepted")
            };
            vec![outcome]
        })
    }
}
