//! Restart policy for the background loops.
//!
//! A loop that returns an error (or panics) is restarted after an
//! exponential backoff with jitter. Once the restart budget is spent the
//! supervisor raises an error-level alert and cancels the shared shutdown
//! token, so the whole process stops with an error instead of running on
//! without that loop.

use std::future::Future;

use folio_telemetry::Metrics;
use folio_ws::connection::calculate_backoff_delay;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::{AppError, AppResult};

/// Supervises one loop at a time.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Run `start()` until it returns `Ok`, shutdown is requested, or the
    /// restart budget is exhausted. Exhaustion cancels `shutdown`.
    pub async fn supervise<F, Fut>(
        &self,
        loop_name: &'static str,
        shutdown: CancellationToken,
        mut start: F,
    ) -> AppResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        let mut restarts = 0u32;
        loop {
            let result = match tokio::spawn(start()).await {
                Ok(result) => result,
                Err(e) => Err(AppError::TaskPanicked {
                    loop_name,
                    message: e.to_string(),
                }),
            };

            let err = match result {
                Ok(()) => {
                    info!(loop_name, "Loop stopped");
                    return Ok(());
                }
                Err(_) if shutdown.is_cancelled() => return Ok(()),
                Err(e) => e,
            };

            if restarts >= self.config.max_restarts {
                error!(
                    loop_name,
                    restarts,
                    error = %err,
                    alert = true,
                    "Loop restart budget exhausted, shutting down"
                );
                shutdown.cancel();
                return Err(AppError::RestartsExhausted { loop_name, restarts });
            }
            restarts += 1;

            let delay = calculate_backoff_delay(
                restarts,
                self.config.base_backoff_ms,
                self.config.max_backoff_ms,
            );
            warn!(
                loop_name,
                attempt = restarts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Loop failed, restarting"
            );
            Metrics::loop_restart(loop_name);

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
