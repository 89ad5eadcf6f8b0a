//! Execution-side order lifecycle types.
//!
//! This module provides types for:
//! - Per-order lifecycle states
//! - Broker-acknowledged pending orders
//! - Cancel requests and their results

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{OrderSide, OutcomeStatus, RequestId};

// ============================================================================
// Order State
// ============================================================================

/// Lifecycle state of an order inside the execution state machine.
///
/// `received -> submitting -> pending -> {filled | cancelled}`; `rejected` and
/// `failed_to_submit` end the lifecycle without a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Received,
    Submitting,
    /// Broker-acknowledged, not yet filled.
    Pending,
    Filled,
    Cancelled,
    /// Business rejection by the broker (or by order limits).
    Rejected,
    /// Transport failures exhausted the retry budget.
    FailedToSubmit,
}

impl OrderState {
    /// Check if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::FailedToSubmit
        )
    }

    /// Whether moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (Received, Submitting)
                | (Received, Rejected)
                | (Submitting, Pending)
                | (Submitting, Rejected)
                | (Submitting, FailedToSubmit)
                | (Pending, Filled)
                | (Pending, Cancelled)
        )
    }
}

// ============================================================================
// Pending Order
// ============================================================================

/// A broker-acknowledged, unfilled order, keyed by the broker order id.
///
/// Created only by the execution state machine on successful submission and
/// removed on confirmed fill or cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub broker_order_id: String,
    pub request_id: RequestId,
    pub ticker: String,
    pub kind: OrderSide,
    pub quantity: u64,
    /// Broker routing/branch reference required to cancel or revise.
    pub routing_reference: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cancel-or-revise request for a pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    #[serde(alias = "order_no")]
    pub broker_order_id: String,
    #[serde(default, alias = "org_no")]
    pub routing_reference: String,
    #[serde(default)]
    pub quantity: u64,
    #[serde(default = "default_cancel_all", alias = "all_qty")]
    pub cancel_all: bool,
}

fn default_cancel_all() -> bool {
    true
}

/// Result of a cancel call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub status: OutcomeStatus,
    pub message: String,
}

impl CancelResult {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// An order the broker reports as still cancelable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelableOrder {
    pub broker_order_id: String,
    pub routing_reference: String,
    pub ticker: String,
    pub kind: Option<OrderSide>,
    pub ordered_quantity: u64,
    pub cancelable_quantity: u64,
    pub price: Decimal,
}
