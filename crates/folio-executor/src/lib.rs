//! Order execution for the folio execution service.
//!
//! # Key Components
//!
//! - [`ExecutionStateMachine`]: per-order lifecycle, request-id dedup, bounded
//!   transport retries, pending book and cancellation
//! - [`OrderLimits`]: limit-order price/notional checks with suggested follow-ups
//! - [`BrokerApi`]: brokerage transaction seam, implemented by [`LiveBroker`],
//!   [`PaperBroker`] and [`MockBroker`]
//! - [`service`]: `/ws/orders` channel, HTTP order/cancel routes and probes
//!
//! # Order flow
//!
//! 1. Unknown kind -> failed `Invalid action: <kind>`, no broker call
//! 2. Previously accepted `request_id` -> recorded outcome, no broker call
//! 3. Limit breach -> failed with `next_action`
//! 4. Submit with up to `max_attempts` tries on transport errors only
//! 5. Accepted -> pending record keyed by broker order id, `success` outcome

pub mod broker_api;
pub mod error;
pub mod limits;
pub mod live;
pub mod machine;
pub mod paper;
pub mod service;

pub use broker_api::{BrokerApi, DynBrokerApi, MockBroker, Submission};
pub use error::{ExecutorError, ExecutorResult, SubmitError};
pub use limits::{LimitBreach, OrderLimits};
pub use live::LiveBroker;
pub use machine::{parse_order, ExecutionStateMachine, ExecutorConfig};
pub use paper::PaperBroker;
pub use service::{create_router, handle_frame, serve, ServerConfig, ServiceState};
