//! HTTP server implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::DashboardResult;
use crate::state::{DashboardState, TriggerResult};
use crate::types::DashboardMessage;

/// Connection limiter to prevent too many concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a slot; the guard releases it on drop.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    dashboard_state: DashboardState,
    connection_limiter: Arc<ConnectionLimiter>,
}

impl AppState {
    pub fn new(dashboard_state: DashboardState, config: &DashboardConfig) -> Self {
        Self {
            dashboard_state,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
        }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/last-cycle", get(get_snapshot))
        .route("/api/decision", post(trigger_decision))
        .route("/api/portfolio", get(get_portfolio))
        .route("/api/buyable", get(get_buyable))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_snapshot(State(state): State<AppState>) -> Json<crate::types::DashboardSnapshot> {
    Json(state.dashboard_state.collect_snapshot())
}

async fn trigger_decision(State(state): State<AppState>) -> Response {
    match state.dashboard_state.request_decision() {
        TriggerResult::Queued => {
            info!("Manual decision cycle requested");
            (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response()
        }
        TriggerResult::AlreadyQueued => {
            (StatusCode::CONFLICT, Json(json!({ "status": "already_queued" }))).into_response()
        }
        TriggerResult::Unavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
            .into_response(),
    }
}

fn account_unavailable(detail: String) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "unavailable", "detail": detail })),
    )
        .into_response()
}

async fn get_portfolio(State(state): State<AppState>) -> Response {
    let Some(account) = state.dashboard_state.account() else {
        return account_unavailable("no account reader configured".to_string());
    };
    match account.portfolio().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            warn!(error = %e, "Portfolio read failed");
            account_unavailable(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct BuyableQuery {
    ticker: Option<String>,
}

async fn get_buyable(State(state): State<AppState>, Query(query): Query<BuyableQuery>) -> Response {
    let Some(ticker) = query.ticker.filter(|t| !t.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "invalid", "detail": "ticker is required" })),
        )
            .into_response();
    };
    let Some(account) = state.dashboard_state.account() else {
        return account_unavailable("no account reader configured".to_string());
    };
    match account.buyable_amount(ticker.trim()).await {
        Ok(amount) => Json(amount).into_response(),
        Err(e) => {
            warn!(%ticker, error = %e, "Buyable amount read failed");
            account_unavailable(e.to_string())
        }
    }
}

async fn get_metrics() -> Response {
    match folio_telemetry::render_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(guard) = state.connection_limiter.try_acquire() else {
        warn!(
            current = state.connection_limiter.current_count(),
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    info!(
        connections = state.connection_limiter.current_count(),
        "New WebSocket connection"
    );

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, guard))
}

/// Handle a WebSocket connection.
async fn handle_ws_connection(socket: WebSocket, state: AppState, _guard: ConnectionGuard) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.dashboard_state.subscribe();

    let initial = DashboardMessage::Snapshot(state.dashboard_state.collect_snapshot());
    if let Ok(json) = serde_json::to_string(&initial) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            debug!("Failed to send initial snapshot, client disconnected");
            return;
        }
    }

    // Drain incoming frames so close is noticed
    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = updates.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            debug!("Failed to send message, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "WebSocket client lagged, catching up");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = &mut incoming_task => {
                debug!("Incoming task completed, closing connection");
                break;
            }
        }
    }

    incoming_task.abort();
    info!("WebSocket connection closed");
}

/// Run the dashboard HTTP server until `shutdown` is cancelled.
pub async fn run_server(
    dashboard_state: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let app = create_router(AppState::new(dashboard_state, &config));

    let addr = config.socket_addr();
    info!(%addr, "Starting dashboard server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Dashboard server stopped");
    Ok(())
}
