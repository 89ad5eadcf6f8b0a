//! Order wire types and identifiers.
//!
//! `OrderMessage` travels from the dispatcher to the execution service and
//! `OrderOutcome` travels back, one per message.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Parse the wire form. Anything other than `buy`/`sell` is rejected.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStyle {
    #[default]
    Market,
    Limit,
}

impl fmt::Display for OrderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Request identifier for idempotency.
///
/// Generated once per logical order and reused when the same order is re-sent,
/// so the execution side can recognise a retry it may already have accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Placeholder used when an inbound frame could not be parsed.
    pub const UNKNOWN: &'static str = "unknown";

    /// Create a new unique request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A discrete order sent over the order channel.
///
/// Field aliases accept the older `action`/`qty`/`order_type`/`price`/`timestamp`
/// spelling used by existing clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderMessage {
    pub request_id: RequestId,
    #[serde(alias = "action")]
    pub kind: OrderSide,
    pub ticker: String,
    #[serde(alias = "qty")]
    pub quantity: u64,
    #[serde(default, alias = "order_type")]
    pub order_style: OrderStyle,
    #[serde(default, alias = "price")]
    pub limit_price: Decimal,
    #[serde(default = "Utc::now", alias = "timestamp")]
    pub issued_at: DateTime<Utc>,
}

impl OrderMessage {
    /// A market order with a fresh request id.
    #[must_use]
    pub fn market(kind: OrderSide, ticker: impl Into<String>, quantity: u64) -> Self {
        Self {
            request_id: RequestId::new(),
            kind,
            ticker: ticker.into(),
            quantity,
            order_style: OrderStyle::Market,
            limit_price: Decimal::ZERO,
            issued_at: Utc::now(),
        }
    }

    /// A limit order with a fresh request id.
    #[must_use]
    pub fn limit(kind: OrderSide, ticker: impl Into<String>, quantity: u64, price: Decimal) -> Self {
        Self {
            order_style: OrderStyle::Limit,
            limit_price: price,
            ..Self::market(kind, ticker, quantity)
        }
    }

    /// `limit_price * quantity`. Zero for market orders.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.limit_price * Decimal::from(self.quantity)
    }
}

/// Terminal status reported for one order message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Pending,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// Reply to exactly one `OrderMessage`.
///
/// `success` means the broker accepted the order (not that it filled).
/// A `failed` outcome may carry a suggested alternative order in `next_action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub request_id: RequestId,
    pub status: OutcomeStatus,
    #[serde(default, alias = "order_no", skip_serializing_if = "Option::is_none")]
    pub broker_order_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Utc::now", alias = "timestamp")]
    pub decided_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<OrderMessage>>,
}

impl OrderOutcome {
    #[must_use]
    pub fn success(
        request_id: RequestId,
        broker_order_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            status: OutcomeStatus::Success,
            broker_order_id: Some(broker_order_id.into()),
            message: message.into(),
            decided_at: Utc::now(),
            next_action: None,
        }
    }

    #[must_use]
    pub fn failed(request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status: OutcomeStatus::Failed,
            broker_order_id: None,
            message: message.into(),
            decided_at: Utc::now(),
            next_action: None,
        }
    }

    #[must_use]
    pub fn pending(request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Pending,
            ..Self::failed(request_id, message)
        }
    }

    /// Attach a suggested alternative order.
    #[must_use]
    pub fn with_suggestion(mut self, next: OrderMessage) -> Self {
        self.next_action = Some(Box::new(next));
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}
