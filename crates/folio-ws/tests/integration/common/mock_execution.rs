//! Mock execution service for integration tests.
//!
//! Accepts order channels, records every order frame with its arrival time,
//! and answers according to a scripted `Behavior`.

use folio_core::{OrderMessage, OrderOutcome};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

type Writer = Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;

/// How the mock answers orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Accept every order after `reply_delay`.
    Accept,
    /// Drop the first connection on its first order, accept afterwards.
    DropFirstOrder,
    /// Fail every order with a suggested alternative.
    SuggestAlways,
    /// Never answer.
    Silent,
    /// Send `{"type":"ping"}` before each answer.
    PingFirst,
}

/// A received order frame.
#[derive(Debug, Clone)]
pub struct Received {
    pub order: OrderMessage,
    pub at: Instant,
}

#[derive(Default)]
struct Shared {
    received: Mutex<Vec<Received>>,
    replies: Mutex<Vec<Instant>>,
    connections: AtomicU32,
    orders: AtomicU32,
    pongs: AtomicU32,
}

/// A scripted execution service.
pub struct MockExecutionServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    shared: Arc<Shared>,
}

impl MockExecutionServer {
    pub async fn start(behavior: Behavior) -> Self {
        Self::start_with_delay(behavior, Duration::from_millis(0)).await
    }

    /// Start on an available port; answers are sent `reply_delay` after the order arrives.
    pub async fn start_with_delay(behavior: Behavior, reply_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let shared_clone = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, shared_clone.clone(), behavior, reply_delay));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            shared,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws/orders", self.addr)
    }

    pub fn connection_count(&self) -> u32 {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn pong_count(&self) -> u32 {
        self.shared.pongs.load(Ordering::SeqCst)
    }

    pub async fn received(&self) -> Vec<Received> {
        self.shared.received.lock().await.clone()
    }

    pub async fn reply_times(&self) -> Vec<Instant> {
        self.shared.replies.lock().await.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    shared: Arc<Shared>,
    behavior: Behavior,
    reply_delay: Duration,
) {
    let connection_index = shared.connections.fetch_add(1, Ordering::SeqCst);

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (write, mut read) = ws_stream.split();
    let write: Writer = Arc::new(Mutex::new(write));

    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };

        if text.contains("\"type\":\"pong\"") {
            shared.pongs.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        let Ok(order) = serde_json::from_str::<OrderMessage>(&text) else {
            continue;
        };
        shared.received.lock().await.push(Received {
            order: order.clone(),
            at: Instant::now(),
        });
        let order_index = shared.orders.fetch_add(1, Ordering::SeqCst);

        let outcome = match behavior {
            Behavior::Silent => continue,
            Behavior::DropFirstOrder if connection_index == 0 && order_index == 0 => {
                // Hang up without answering.
                return;
            }
            Behavior::SuggestAlways => {
                let suggestion = OrderMessage::limit(
                    order.kind,
                    order.ticker.clone(),
                    order.quantity / 2,
                    order.limit_price,
                );
                OrderOutcome::failed(order.request_id.clone(), "notional above limit")
                    .with_suggestion(suggestion)
            }
            _ => OrderOutcome::success(order.request_id.clone(), "0000001", "accepted"),
        };

        if behavior == Behavior::PingFirst {
            let _ = write
                .lock()
                .await
                .send(Message::Text(r#"{"type":"ping"}"#.to_string()))
                .await;
        }

        let write = write.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(reply_delay).await;
            let json = serde_json::to_string(&outcome).unwrap();
            let mut sink = write.lock().await;
            shared.replies.lock().await.push(Instant::now());
            let _ = sink.send(Message::Text(json)).await;
        });
    }
}
