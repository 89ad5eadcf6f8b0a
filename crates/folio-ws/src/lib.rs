//! Order dispatcher for the folio execution channel.
//!
//! Keeps at most one WebSocket channel open to the execution service and
//! pushes orders through it one at a time:
//! - Lazy connect with exponential backoff
//! - Exactly one `OrderOutcome` awaited per `OrderMessage`, with a timeout
//! - Reconnect and resend once (same `request_id`) on a mid-wait disconnect
//! - One follow-up for a suggested alternative order
//! - Application-level ping/pong handling
//!
//! Loops hand orders to an [`OrderSink`]; the dispatcher is the live one.

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod sink;

pub use connection::{ChannelConfig, ConnectionState, OrderChannel};
pub use dispatcher::OrderDispatcher;
pub use error::{WsError, WsResult};
pub use message::{parse_inbound, ControlFrame, InboundFrame};
pub use sink::{DynOrderSink, MockOrderSink, OrderSink};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` channel is opened.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
