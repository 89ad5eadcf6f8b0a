//! Process wiring for the two binaries.
//!
//! `Manager` runs the decision and risk loops under supervision, plus the
//! dashboard. `ExecutionService` serves the order channel in front of the
//! paper or live broker.

use std::sync::Arc;

use folio_broker::{
    AccountCredentials, AuthConfig, BrokerAccountReader, BrokerClient, BrokerConfig,
    DynAccountReader, DynCredentialProvider, DynSignalSource, HttpAdvisorSource,
    HttpCandidateSource, HttpCredentialProvider, HttpSignalSource,
};
use folio_core::{Clock, SystemClock};
use folio_dashboard::{run_server, DashboardState};
use folio_decision::DecisionEngine;
use folio_executor::{
    serve, DynBrokerApi, ExecutionStateMachine, LiveBroker, PaperBroker, ServiceState,
};
use folio_persistence::OutcomeJournal;
use folio_risk::RiskMonitor;
use folio_ws::{DynOrderSink, OrderDispatcher};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{ExecutionConfig, ManagerConfig, OperatingMode};
use crate::cycle::{CycleRecorder, DecisionCycle};
use crate::error::AppResult;
use crate::schedule::{DecisionLoop, RiskLoop};
use crate::supervisor::Supervisor;

/// Brokerage client from config and environment.
fn broker_client(broker: &BrokerConfig, auth: &AuthConfig) -> AppResult<Arc<BrokerClient>> {
    let credentials: DynCredentialProvider = Arc::new(HttpCredentialProvider::new(auth)?);
    let account = AccountCredentials::from_env(broker)?;
    Ok(Arc::new(BrokerClient::new(broker, account, credentials)?))
}

/// Portfolio manager process.
pub struct Manager {
    config: ManagerConfig,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Loops finish their current cycle, then the dispatcher closes the
    /// channel and the journal is flushed.
    pub async fn run(self, shutdown: CancellationToken) -> AppResult<()> {
        let config = self.config;
        info!(
            dispatcher = %config.dispatcher.url,
            decision_source = ?config.decision.source,
            "Starting portfolio manager"
        );

        let client = broker_client(&config.broker, &config.auth)?;
        let account: DynAccountReader = Arc::new(BrokerAccountReader::new(client));
        let signals: DynSignalSource = Arc::new(HttpSignalSource::new(config.signals.clone())?);
        let dispatcher = Arc::new(OrderDispatcher::new(config.dispatcher.clone()));
        let orders: DynOrderSink = dispatcher.clone();

        let mut cycle = DecisionCycle::new(
            DecisionEngine::new(config.decision.clone()),
            config.constraints.clone(),
            account.clone(),
            signals,
            orders.clone(),
        );
        if config.candidates.url.is_some() {
            cycle = cycle.with_candidates(Arc::new(HttpCandidateSource::new(
                config.candidates.clone(),
            )?));
        }
        if let Some(advisor) = HttpAdvisorSource::from_config(&config.advisor)? {
            cycle = cycle.with_advisor(Arc::new(advisor));
        }

        let journal = OutcomeJournal::from_config(&config.persistence)?;
        let (dashboard, trigger_rx) = DashboardState::with_trigger();
        let dashboard = dashboard.with_account(account.clone());
        let recorder = CycleRecorder::new(Some(journal), dashboard.clone());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let alert_after = config.supervisor.max_consecutive_failures;

        let decision_loop = DecisionLoop::new(
            Arc::new(cycle),
            recorder.clone(),
            config.schedule.clone(),
            clock.clone(),
            alert_after,
        )
        .with_trigger(trigger_rx);
        let risk_loop = RiskLoop::new(
            Arc::new(RiskMonitor::new(config.risk.clone(), account, orders)),
            recorder.clone(),
            config.schedule.market_hours.clone(),
            clock,
            alert_after,
        );

        let dashboard_task = config.dashboard.enabled.then(|| {
            tokio::spawn(run_server(
                dashboard,
                config.dashboard.clone(),
                shutdown.clone(),
            ))
        });

        let supervisor = Supervisor::new(config.supervisor.clone());
        let decision_token = shutdown.clone();
        let risk_token = shutdown.clone();
        let (decision_result, risk_result) = tokio::join!(
            supervisor.supervise("decision", shutdown.clone(), move || {
                let l = decision_loop.clone();
                let token = decision_token.clone();
                async move { l.run(token).await }
            }),
            supervisor.supervise("risk", shutdown.clone(), move || {
                let l = risk_loop.clone();
                let token = risk_token.clone();
                async move { l.run(token).await }
            }),
        );

        dispatcher.shutdown().await;
        recorder.close();

        if let Some(task) = dashboard_task {
            shutdown.cancel();
            match task.await {
                Ok(Err(e)) => error!(error = %e, "Dashboard server failed"),
                Err(e) => error!(error = %e, "Dashboard task panicked"),
                Ok(Ok(())) => {}
            }
        }

        decision_result?;
        risk_result?;
        info!("Portfolio manager stopped");
        Ok(())
    }
}

/// Execution service process.
pub struct ExecutionService {
    config: ExecutionConfig,
}

impl ExecutionService {
    pub fn new(config: ExecutionConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn broker(&self) -> AppResult<DynBrokerApi> {
        Ok(match self.config.mode {
            OperatingMode::Paper => {
                info!("Paper mode: orders stay in the in-process book");
                Arc::new(PaperBroker::new())
            }
            OperatingMode::Live => {
                info!(base_url = %self.config.broker.base_url, "Live mode: orders go to the brokerage");
                Arc::new(LiveBroker::new(broker_client(
                    &self.config.broker,
                    &self.config.auth,
                )?))
            }
        })
    }

    pub async fn run(self, shutdown: CancellationToken) -> AppResult<()> {
        let machine = Arc::new(ExecutionStateMachine::new(
            self.broker()?,
            self.config.limits.clone(),
            self.config.executor.clone(),
        ));
        let state = ServiceState::new(machine, &self.config.server);
        serve(&self.config.server, state, shutdown).await?;
        Ok(())
    }
}
