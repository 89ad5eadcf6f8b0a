//! Sequential order dispatcher.
//!
//! The channel slot lives behind an async mutex that doubles as the dispatch
//! gate: whoever holds the lock owns the channel for one full round-trip, so
//! at most one order is ever awaiting an outcome, no matter how many loops
//! call in concurrently.

use crate::connection::{ChannelConfig, ConnectionState, OrderChannel};
use crate::error::{WsError, WsResult};
use chrono::Utc;
use folio_core::{OrderMessage, OrderOutcome, RequestId};
use folio_telemetry::Metrics;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Order dispatcher with a lazily opened, shared channel.
pub struct OrderDispatcher {
    config: ChannelConfig,
    /// Dispatch gate and channel slot.
    channel: TokioMutex<Option<OrderChannel>>,
    state: RwLock<ConnectionState>,
    reconnect_count: AtomicU64,
    shutdown_token: CancellationToken,
}

impl OrderDispatcher {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            channel: TokioMutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            reconnect_count: AtomicU64::new(0),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Number of mid-order reconnects since start.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Stop accepting orders and close the channel.
    ///
    /// Waits for the gate, so an order already on the wire finishes its
    /// round-trip first.
    pub async fn shutdown(&self) {
        info!("Dispatcher shutdown requested");
        self.shutdown_token.cancel();
        let mut slot = self.channel.lock().await;
        if let Some(channel) = slot.take() {
            channel.close().await;
        }
        *self.state.write() = ConnectionState::Disconnected;
    }

    /// Dispatch one order and return its outcome.
    ///
    /// Never fails: transport problems become a `failed` outcome for this
    /// order only.
    pub async fn dispatch(&self, order: &OrderMessage) -> OrderOutcome {
        self.dispatch_as(order, "primary").await
    }

    async fn dispatch_as(&self, order: &OrderMessage, origin: &str) -> OrderOutcome {
        let mut slot = self.channel.lock().await;

        if self.is_shutdown() {
            return OrderOutcome::failed(order.request_id.clone(), WsError::Shutdown.to_string());
        }

        Metrics::order_dispatched(&order.kind.to_string(), origin);
        let started = std::time::Instant::now();
        let outcome = match self.round_trip(&mut slot, order).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_disconnect() => {
                warn!(
                    request_id = %order.request_id,
                    error = %e,
                    "Channel lost mid-order, resending once on a fresh channel"
                );
                self.reconnect_count.fetch_add(1, Ordering::Relaxed);
                Metrics::channel_reconnect("disconnect");
                match self.round_trip(&mut slot, order).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(request_id = %order.request_id, error = %e, "Resend failed");
                        OrderOutcome::failed(order.request_id.clone(), format!("Resend failed: {e}"))
                    }
                }
            }
            Err(e) => {
                error!(request_id = %order.request_id, error = %e, "Dispatch failed");
                OrderOutcome::failed(order.request_id.clone(), format!("Dispatch failed: {e}"))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let status = outcome.status.to_string();
        Metrics::order_outcome(&status);
        Metrics::dispatch_latency(&status, elapsed_ms as f64);
        debug!(
            request_id = %order.request_id,
            status = %outcome.status,
            elapsed_ms,
            "Order round-trip finished"
        );
        outcome
    }

    /// Dispatch an order and, if it fails with a suggested alternative,
    /// dispatch that alternative once under a fresh `request_id`.
    ///
    /// Suggestions on the follow-up's outcome are not chased.
    pub async fn dispatch_with_follow_up(&self, order: &OrderMessage) -> Vec<OrderOutcome> {
        let first = self.dispatch(order).await;
        let suggestion = if first.is_failed() {
            first.next_action.clone()
        } else {
            None
        };

        let mut outcomes = vec![first];
        if let Some(next) = suggestion {
            let mut follow_up = *next;
            follow_up.request_id = RequestId::new();
            follow_up.issued_at = Utc::now();
            info!(
                original = %order.request_id,
                request_id = %follow_up.request_id,
                ticker = %follow_up.ticker,
                quantity = follow_up.quantity,
                price = %follow_up.limit_price,
                "Following suggested alternative order"
            );
            outcomes.push(self.dispatch_as(&follow_up, "follow_up").await);
        }
        outcomes
    }

    /// Dispatch orders strictly in sequence, continuing past failures.
    ///
    /// Every order gets an outcome; after shutdown the rest are failed
    /// without touching the channel.
    pub async fn dispatch_batch(&self, orders: &[OrderMessage]) -> Vec<OrderOutcome> {
        let mut outcomes = Vec::with_capacity(orders.len());
        for order in orders {
            outcomes.extend(self.dispatch_with_follow_up(order).await);
        }
        outcomes
    }

    async fn round_trip(
        &self,
        slot: &mut Option<OrderChannel>,
        order: &OrderMessage,
    ) -> WsResult<OrderOutcome> {
        if slot.is_none() {
            let channel = self.connect().await?;
            *slot = Some(channel);
        }
        let Some(channel) = slot.as_mut() else {
            return Err(WsError::ConnectionFailed("channel unavailable".to_string()));
        };

        let result = channel.round_trip(order, self.config.reply_timeout()).await;
        if result.is_err() {
            // A channel that failed mid-order (including a reply timeout) is
            // never reused: its next frame could belong to this order.
            *slot = None;
            *self.state.write() = ConnectionState::Disconnected;
            Metrics::channel_disconnected();
        }
        result
    }

    async fn connect(&self) -> WsResult<OrderChannel> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            *self.state.write() = ConnectionState::Connecting;
            match OrderChannel::open(&self.config).await {
                Ok(channel) => {
                    *self.state.write() = ConnectionState::Connected;
                    Metrics::channel_connected();
                    return Ok(channel);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Order channel connect failed");
                    Metrics::channel_reconnect("connect_failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                let delay = self.config.backoff_delay(attempt);
                // Cancellation-aware sleep
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = self.shutdown_token.cancelled() => {
                        *self.state.write() = ConnectionState::Disconnected;
                        return Err(WsError::Shutdown);
                    }
                }
            }
        }

        *self.state.write() = ConnectionState::Disconnected;
        Err(last_error.unwrap_or_else(|| {
            WsError::ConnectionFailed("no connection attempts made".to_string())
        }))
    }
}
