//! Execution service HTTP/WebSocket surface.
//!
//! `/ws/orders` carries one `OrderOutcome` per `OrderMessage`, processed in
//! arrival order, plus an application-level ping every `ping_interval_secs`.
//! The HTTP routes expose the same state machine for manual use and probes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use folio_core::{CancelRequest, OrderOutcome, RequestId};
use folio_ws::ControlFrame;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::machine::{parse_order, ExecutionStateMachine};

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:8005".to_string()
}

fn default_ping_interval_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

/// Shared state for handlers.
#[derive(Clone)]
pub struct ServiceState {
    machine: Arc<ExecutionStateMachine>,
    ping_interval: Duration,
}

impl ServiceState {
    pub fn new(machine: Arc<ExecutionStateMachine>, config: &ServerConfig) -> Self {
        Self {
            machine,
            ping_interval: Duration::from_secs(config.ping_interval_secs.max(1)),
        }
    }
}

/// Create the axum router.
pub fn create_router(state: ServiceState) -> Router {
    Router::new()
        .route("/ws/orders", get(ws_orders))
        .route("/api/order", post(place_order))
        .route("/api/cancel-order", post(cancel_order))
        .route("/api/cancelable-orders", get(cancelable_orders))
        .route("/api/pending-orders", get(pending_orders))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    config: &ServerConfig,
    state: ServiceState,
    shutdown: CancellationToken,
) -> ExecutorResult<()> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|e| ExecutorError::InvalidConfig(format!("bind address {}: {e}", config.bind)))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Execution service listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Execution service stopped");
    Ok(())
}

/// Reply for one inbound text frame; `None` for control frames needing none.
pub async fn handle_frame(machine: &ExecutionStateMachine, text: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            warn!("Unparsable order frame");
            let outcome = OrderOutcome::failed(RequestId::unknown(), "Invalid JSON format");
            return serde_json::to_string(&outcome).ok();
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("pong") => return None,
        Some("ping") => return Some(ControlFrame::Pong.to_text()),
        _ => {}
    }

    let outcome = match parse_order(value) {
        Ok(order) => machine.execute(&order).await,
        Err(outcome) => outcome,
    };
    serde_json::to_string(&outcome).ok()
}

async fn ws_orders(State(state): State<ServiceState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_order_channel(socket, state))
}

async fn handle_order_channel(socket: WebSocket, state: ServiceState) {
    info!("Order channel client connected");
    let (mut sender, mut receiver) = socket.split();

    let mut ping = tokio::time::interval(state.ping_interval);
    // First tick completes immediately
    ping.tick().await;

    loop {
        tokio::select! {
            _ = ping.tick() => {
                let frame = json!({"type": "ping", "timestamp": chrono::Utc::now()}).to_string();
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    debug!("Ping failed, client gone");
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_frame(&state.machine, text.as_str()).await {
                            if sender.send(Message::Text(reply.into())).await.is_err() {
                                warn!("Failed to send reply, client gone");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Order channel receive error");
                        break;
                    }
                }
            }
        }
    }

    info!("Order channel client disconnected");
}

async fn place_order(State(state): State<ServiceState>, Json(body): Json<Value>) -> Json<OrderOutcome> {
    let outcome = match parse_order(body) {
        Ok(order) => state.machine.execute(&order).await,
        Err(outcome) => outcome,
    };
    Json(outcome)
}

async fn cancel_order(
    State(state): State<ServiceState>,
    Json(request): Json<CancelRequest>,
) -> impl IntoResponse {
    Json(state.machine.cancel(&request).await)
}

async fn cancelable_orders(State(state): State<ServiceState>) -> impl IntoResponse {
    Json(json!({ "orders": state.machine.cancelable_orders().await }))
}

async fn pending_orders(State(state): State<ServiceState>) -> impl IntoResponse {
    Json(json!({ "orders": state.machine.pending_orders() }))
}

async fn liveness() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn readiness(State(state): State<ServiceState>) -> Response {
    if state.machine.is_ready().await {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "detail": "credential unavailable" })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker_api::MockBroker;
    use crate::limits::OrderLimits;
    use crate::machine::ExecutorConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state_with(broker: Arc<MockBroker>) -> ServiceState {
        let machine = ExecutionStateMachine::new(broker, OrderLimits::default(), ExecutorConfig::default());
        ServiceState::new(Arc::new(machine), &ServerConfig::default())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_json_frame() {
        let state = state_with(Arc::new(MockBroker::new()));
        let reply = handle_frame(&state.machine, "not json").await.unwrap();
        let outcome: OrderOutcome = serde_json::from_str(&reply).unwrap();
        assert_eq!(outcome.request_id.as_str(), "unknown");
        assert_eq!(outcome.message, "Invalid JSON format");
    }

    #[tokio::test]
    async fn test_control_frames() {
        let state = state_with(Arc::new(MockBroker::new()));
        assert_eq!(handle_frame(&state.machine, r#"{"type":"pong"}"#).await, None);
        assert_eq!(
            handle_frame(&state.machine, r#"{"type":"ping"}"#).await,
            Some(ControlFrame::Pong.to_text())
        );
    }

    #[tokio::test]
    async fn test_invalid_action_skips_broker() {
        let broker = Arc::new(MockBroker::new());
        let state = state_with(broker.clone());
        let reply = handle_frame(
            &state.machine,
            r#"{"request_id":"r-9","action":"short","ticker":"005930","qty":1}"#,
        )
        .await
        .unwrap();
        let outcome: OrderOutcome = serde_json::from_str(&reply).unwrap();
        assert_eq!(outcome.message, "Invalid action: short");
        assert!(broker.submits().is_empty());
    }

    #[tokio::test]
    async fn test_http_order_then_pending_listing() {
        let state = state_with(Arc::new(MockBroker::new()));
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/order")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"request_id":"r-1","kind":"buy","ticker":"005930","quantity":2}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = body_json(response).await;
        assert_eq!(outcome["status"], "success");

        let response = app
            .oneshot(Request::get("/api/pending-orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let listing = body_json(response).await;
        assert_eq!(listing["orders"][0]["request_id"], "r-1");
    }

    #[tokio::test]
    async fn test_readiness_follows_broker() {
        let broker = Arc::new(MockBroker::new());
        let app = create_router(state_with(broker.clone()));

        let ready = app
            .clone()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);

        broker.set_ready(false);
        let not_ready = app
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cancel_route() {
        let broker = Arc::new(MockBroker::new());
        let app = create_router(state_with(broker.clone()));

        let response = app
            .oneshot(
                Request::post("/api/cancel-order")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"order_no":"0000000001","org_no":"00950","all_qty":true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let result = body_json(response).await;
        assert_eq!(result["status"], "success");
        assert_eq!(broker.cancels()[0].broker_order_id, "0000000001");
    }
}
