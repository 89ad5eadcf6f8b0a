//! Signal provider reads.
//!
//! Each analysis service exposes `POST {host}/api/result` returning
//! `{timestamp, summation: [f64, ...]}`. Hosts are read concurrently; a host
//! that keeps failing after its retries contributes nothing.

use crate::error::{BrokerError, BrokerResult};
use chrono::{DateTime, Utc};
use folio_core::{BoxFuture, SignalSample};
use futures_util::future::join_all;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Signal provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Base URLs of the analysis services.
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Wire form of one provider's result.
#[derive(Debug, Deserialize)]
struct ProviderResult {
    timestamp: DateTime<Utc>,
    summation: Vec<f64>,
}

/// Source of the current signal samples.
pub trait SignalSource: Send + Sync {
    /// Samples from every provider that answered; never fails as a whole.
    fn collect(&self) -> BoxFuture<'_, Vec<SignalSample>>;
}

/// Arc wrapper for SignalSource trait objects.
pub type DynSignalSource = Arc<dyn SignalSource>;

/// HTTP signal collector.
pub struct HttpSignalSource {
    client: Client,
    config: SignalsConfig,
}

impl HttpSignalSource {
    pub fn new(config: SignalsConfig) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BrokerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn fetch_once(&self, host: &str) -> BrokerResult<SignalSample> {
        let url = format!("{}/api/result", host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| BrokerError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::HttpClient(format!("HTTP {status}")));
        }

        let body: ProviderResult = response
            .json()
            .await
            .map_err(|e| BrokerError::ParseError(format!("invalid provider result: {e}")))?;

        SignalSample::new(host, body.timestamp, body.summation)
            .map_err(|e| BrokerError::ParseError(e.to_string()))
    }

    /// Fetch one provider with bounded retries.
    pub async fn fetch(&self, host: &str) -> BrokerResult<SignalSample> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(host).await {
                Ok(sample) => return Ok(sample),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(host, attempt, error = %e, "Signal provider failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn collect_all(&self) -> Vec<SignalSample> {
        let reads = self.config.hosts.iter().map(|host| async move {
            let result = self.fetch(host).await;
            (host, result)
        });

        join_all(reads)
            .await
            .into_iter()
            .filter_map(|(host, result)| match result {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!(host = %host, error = %e, "Signal provider unavailable");
                    None
                }
            })
            .collect()
    }
}

impl SignalSource for HttpSignalSource {
    fn collect(&self) -> BoxFuture<'_, Vec<SignalSample>> {
        Box::pin(self.collect_all())
    }
}

/// Fixed samples, for testing.
#[derive(Debug, Default)]
pub struct MockSignalSource {
    samples: Mutex<Vec<SignalSample>>,
}

impl MockSignalSource {
    pub fn new(samples: Vec<SignalSample>) -> Self {
        Self {
            samples: Mutex::new(samples),
        }
    }

    pub fn set_samples(&self, samples: Vec<SignalSample>) {
        *self.samples.lock() = samples;
    }
}

impl SignalSource for MockSignalSource {
    fn collect(&self) -> BoxFuture<'_, Vec<SignalSample>> {
        Box::pin(async move { self.samples.lock().clone() })
    }
}
