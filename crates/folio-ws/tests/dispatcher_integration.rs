//! Dispatcher integration tests.
//!
//! Tests the order channel protocol end to end:
//! - One outcome per order over a reused channel
//! - Resend with the same request id after a disconnect
//! - Suggested alternatives followed exactly once
//! - Strict one-in-flight dispatch across concurrent callers

mod integration;
use integration::common::mock_execution::{Behavior, MockExecutionServer};

use folio_core::{OrderMessage, OrderSide};
use folio_ws::{ChannelConfig, ConnectionState, OrderDispatcher};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn config_for(server: &MockExecutionServer) -> ChannelConfig {
    ChannelConfig {
        url: server.url(),
        reply_timeout_ms: 2_000,
        connect_timeout_ms: 1_000,
        connect_attempts: 3,
        reconnect_base_delay_ms: 10,
        reconnect_max_delay_ms: 50,
    }
}

#[tokio::test]
async fn test_round_trip_reuses_channel() {
    let server = MockExecutionServer::start(Behavior::Accept).await;
    let dispatcher = OrderDispatcher::new(config_for(&server));

    let first = OrderMessage::market(OrderSide::Buy, "005930", 10);
    let second = OrderMessage::market(OrderSide::Sell, "000660", 2);

    let o1 = dispatcher.dispatch(&first).await;
    let o2 = dispatcher.dispatch(&second).await;

    assert!(o1.is_success(), "first outcome: {o1:?}");
    assert_eq!(o1.request_id, first.request_id);
    assert_eq!(o2.request_id, second.request_id);
    assert_eq!(server.connection_count(), 1, "channel should be reused");
    assert_eq!(dispatcher.state(), ConnectionState::Connected);

    dispatcher.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_resend_after_disconnect_keeps_request_id() {
    let server = MockExecutionServer::start(Behavior::DropFirstOrder).await;
    let dispatcher = OrderDispatcher::new(config_for(&server));

    let order = OrderMessage::market(OrderSide::Sell, "005930", 5);
    let outcome = dispatcher.dispatch(&order).await;

    assert!(outcome.is_success(), "resend should succeed: {outcome:?}");
    assert_eq!(dispatcher.reconnect_count(), 1);
    assert_eq!(server.connection_count(), 2);

    let received = server.received().await;
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].order.request_id, order.request_id);
    assert_eq!(received[1].order.request_id, order.request_id);

    server.shutdown().await;
}

#[tokio::test]
async fn test_suggestion_followed_exactly_once() {
    let server = MockExecutionServer::start(Behavior::SuggestAlways).await;
    let dispatcher = OrderDispatcher::new(config_for(&server));

    let order = OrderMessage::limit(OrderSide::Buy, "SPY", 10, dec!(100));
    let outcomes = dispatcher.dispatch_with_follow_up(&order).await;

    assert_eq!(outcomes.len(), 2, "original plus one follow-up");
    assert!(outcomes.iter().all(|o| o.is_failed()));

    let received = server.received().await;
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].order.quantity, 5);
    assert_ne!(
        received[1].order.request_id, order.request_id,
        "follow-up is a new logical order"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_reply_timeout_fails_order() {
    let server = MockExecutionServer::start(Behavior::Silent).await;
    let dispatcher = OrderDispatcher::new(ChannelConfig {
        reply_timeout_ms: 200,
        ..config_for(&server)
    });

    let order = OrderMessage::market(OrderSide::Buy, "005930", 1);
    let outcome = timeout(Duration::from_secs(5), dispatcher.dispatch(&order))
        .await
        .expect("dispatch must be bounded");

    assert!(outcome.is_failed());
    assert!(outcome.message.contains("Timed out"), "{}", outcome.message);
    assert_eq!(dispatcher.state(), ConnectionState::Disconnected);

    server.shutdown().await;
}

#[tokio::test]
async fn test_ping_answered_while_waiting() {
    let server = MockExecutionServer::start(Behavior::PingFirst).await;
    let dispatcher = OrderDispatcher::new(config_for(&server));

    let outcome = dispatcher
        .dispatch(&OrderMessage::market(OrderSide::Buy, "005930", 1))
        .await;
    assert!(outcome.is_success());

    let ponged = timeout(Duration::from_secs(2), async {
        while server.pong_count() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(ponged.is_ok(), "dispatcher should answer ping with pong");

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_callers_never_pipeline() {
    let server =
        MockExecutionServer::start_with_delay(Behavior::Accept, Duration::from_millis(50)).await;
    let dispatcher = Arc::new(OrderDispatcher::new(config_for(&server)));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let order = OrderMessage::market(OrderSide::Buy, format!("T{i}"), 1);
                dispatcher.dispatch(&order).await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    let received = server.received().await;
    let replies = server.reply_times().await;
    assert_eq!(received.len(), 4);
    assert_eq!(replies.len(), 4);
    for i in 0..3 {
        assert!(
            received[i + 1].at >= replies[i],
            "order {} arrived before order {} was answered",
            i + 1,
            i
        );
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_batch_continues_after_failure() {
    let server = MockExecutionServer::start(Behavior::DropFirstOrder).await;
    let dispatcher = OrderDispatcher::new(config_for(&server));

    let orders = vec![
        OrderMessage::market(OrderSide::Sell, "005930", 1),
        OrderMessage::market(OrderSide::Buy, "000660", 1),
    ];
    let outcomes = dispatcher.dispatch_batch(&orders).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].request_id, orders[0].request_id);
    assert_eq!(outcomes[1].request_id, orders[1].request_id);
    assert!(outcomes[1].is_success());

    server.shutdown().await;
}
