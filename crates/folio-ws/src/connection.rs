//! A single order channel to the execution service.
//!
//! Handles connecting (with timeout), the request/reply round-trip, keepalive
//! frames, and the backoff schedule used between connection attempts.

use crate::error::{WsError, WsResult};
use crate::message::{parse_inbound, ControlFrame, InboundFrame};
use folio_core::{OrderMessage, OrderOutcome, RequestId};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

/// Dispatcher channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Execution service WebSocket URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// How long to wait for the one outcome that answers an order.
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Connection attempts per dispatch before the order is failed.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Base delay for exponential backoff.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_url() -> String {
    "ws://127.0.0.1:8005/ws/orders".to_string()
}

fn default_reply_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_reconnect_base_delay_ms() -> u64 {
    500
}

fn default_reconnect_max_delay_ms() -> u64 {
    5_000
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reply_timeout_ms: default_reply_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_attempts: default_connect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

impl ChannelConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Backoff before connection attempt `attempt + 1`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        calculate_backoff_delay(
            attempt,
            self.reconnect_base_delay_ms,
            self.reconnect_max_delay_ms,
        )
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type ChannelStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open channel. Dropped and replaced on disconnect.
pub struct OrderChannel {
    stream: ChannelStream,
}

impl OrderChannel {
    /// Connect to the execution service.
    pub async fn open(config: &ChannelConfig) -> WsResult<Self> {
        info!(url = %config.url, "Opening order channel");

        // TCP_NODELAY: orders are small and latency-sensitive.
        let connect = connect_async_tls_with_config(&config.url, None, true, None);
        let (stream, _response) = tokio::time::timeout(config.connect_timeout(), connect)
            .await
            .map_err(|_| WsError::Timeout(format!("connecting to {}", config.url)))?
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        info!("Order channel connected");
        Ok(Self { stream })
    }

    /// Send one order and wait for its outcome.
    ///
    /// Keepalive frames are answered while waiting. An outcome whose
    /// `request_id` belongs to another order (a late reply) is discarded; an
    /// outcome with the `unknown` id means the service could not parse the
    /// frame and is returned as the answer.
    pub async fn round_trip(
        &mut self,
        order: &OrderMessage,
        reply_timeout: Duration,
    ) -> WsResult<OrderOutcome> {
        let payload = serde_json::to_string(order)?;
        self.stream
            .send(Message::Text(payload))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;
        debug!(request_id = %order.request_id, ticker = %order.ticker, "Order sent");

        let deadline = tokio::time::Instant::now() + reply_timeout;

        loop {
            let frame = tokio::time::timeout_at(deadline, self.stream.next())
                .await
                .map_err(|_| {
                    WsError::Timeout(format!("no outcome for request {}", order.request_id))
                })?;

            match frame {
                Some(Ok(Message::Text(text))) => match parse_inbound(&text) {
                    Ok(InboundFrame::Control(ControlFrame::Ping)) => {
                        debug!("Received ping, sending pong");
                        self.stream
                            .send(Message::Text(ControlFrame::Pong.to_text()))
                            .await
                            .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    }
                    Ok(InboundFrame::Control(ControlFrame::Pong)) => {}
                    Ok(InboundFrame::Outcome(outcome)) => {
                        if outcome.request_id == order.request_id
                            || outcome.request_id.as_str() == RequestId::UNKNOWN
                        {
                            return Ok(outcome);
                        }
                        warn!(
                            expected = %order.request_id,
                            received = %outcome.request_id,
                            "Discarding outcome for another request"
                        );
                    }
                    Err(e) => {
                        warn!(?e, "Ignoring unparsable frame");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (f.code.into(), f.reason.to_string()))
                        .unwrap_or((1000, "Normal close".to_string()));
                    warn!(code, %reason, "Order channel closed by server");
                    return Err(WsError::ConnectionClosed { code, reason });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(WsError::ConnectionClosed {
                        code: 1006,
                        reason: "Stream ended".to_string(),
                    })
                }
            }
        }
    }

    /// Send a Close frame. Errors are logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(?e, "Close frame not delivered");
        }
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max`, plus jitter.
pub fn calculate_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    Duration::from_millis(delay + rand_jitter(base_ms))
}

/// Random jitter in `[0, bound)` ms, at most one second.
fn rand_jitter(bound_ms: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let bound = bound_ms.clamp(1, 1000);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % bound
}
