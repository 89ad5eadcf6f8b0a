//! Decision cycle -> order channel -> execution service (paper) -> journal.

use std::sync::Arc;

use chrono::Utc;
use folio_bot::{CycleRecorder, DecisionCycle};
use folio_broker::{MockAccountReader, MockCandidateSource, MockSignalSource};
use folio_core::{Constraints, OrderSide, OutcomeStatus, PortfolioSnapshot, SignalSample};
use folio_dashboard::{CycleLoop, CycleStatus, DashboardState};
use folio_decision::DecisionEngine;
use folio_executor::{
    create_router, ExecutionStateMachine, ExecutorConfig, OrderLimits, PaperBroker, ServerConfig,
    ServiceState,
};
use folio_persistence::{OrderOrigin, OutcomeJournal};
use folio_ws::{ChannelConfig, OrderDispatcher};
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn start_execution_service(broker: Arc<PaperBroker>) -> String {
    let machine = Arc::new(ExecutionStateMachine::new(
        broker,
        OrderLimits::default(),
        ExecutorConfig::default(),
    ));
    let state = ServiceState::new(machine, &ServerConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });
    format!("ws://{addr}/ws/orders")
}

#[tokio::test]
async fn test_buy_cycle_reaches_paper_broker_and_journal() {
    let broker = Arc::new(PaperBroker::new());
    let url = start_execution_service(broker.clone()).await;
    let dispatcher = Arc::new(OrderDispatcher::new(ChannelConfig {
        url,
        reply_timeout_ms: 5_000,
        ..Default::default()
    }));

    let account = Arc::new(MockAccountReader::new());
    account.set_snapshot(Some(PortfolioSnapshot::new(
        dec!(10000000),
        dec!(10000000),
        vec![],
    )));
    let signals = Arc::new(MockSignalSource::new(vec![
        SignalSample::new("svc", Utc::now(), vec![0.6, 0.4]).unwrap(),
    ]));
    let candidates = Arc::new(MockCandidateSource::new());
    candidates.add("005930", dec!(70000));

    let cycle = DecisionCycle::new(
        DecisionEngine::default(),
        Constraints::default(),
        account,
        signals,
        dispatcher.clone(),
    )
    .with_candidates(candidates);

    let dir = tempfile::tempdir().unwrap();
    let journal = OutcomeJournal::new(dir.path(), 1).unwrap();
    let dashboard = DashboardState::new();
    let recorder = CycleRecorder::new(Some(journal), dashboard.clone());

    let report = cycle.run(&CancellationToken::new()).await;
    recorder.finish(report);
    recorder.close();
    dispatcher.shutdown().await;

    let last = dashboard.last_cycle(CycleLoop::Decision).unwrap();
    assert_eq!(last.status, CycleStatus::Completed);
    assert_eq!(last.records.len(), 1);
    assert_eq!(last.count(OutcomeStatus::Success), 1);
    assert_eq!(broker.open_orders(), 1);

    let reader = OutcomeJournal::new(dir.path(), 1).unwrap();
    let journaled = reader.read_day(Utc::now().date_naive()).unwrap();
    assert_eq!(journaled.len(), 1);
    assert_eq!(journaled[0].origin, OrderOrigin::Decision);
    assert_eq!(journaled[0].ticker, "005930");
    assert_eq!(journaled[0].kind, OrderSide::Buy);
    assert!(journaled[0].outcome.is_success());
}
