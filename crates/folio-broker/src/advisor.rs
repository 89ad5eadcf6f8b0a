//! External decision advisor.
//!
//! The advisor receives the cycle context (portfolio, universe, signal
//! aggregate) and answers with a decision document. The document is returned
//! as raw text: validation belongs to the decision engine, which falls back to
//! all-HOLD on anything it rejects.

use crate::error::{BrokerError, BrokerResult};
use folio_core::BoxFuture;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Advisor settings. Disabled when `url` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Source of advisor decision documents.
pub trait AdvisorSource: Send + Sync {
    /// Raw decision document for `context`.
    fn advise(&self, context: Value) -> BoxFuture<'_, BrokerResult<String>>;
}

/// Arc wrapper for AdvisorSource trait objects.
pub type DynAdvisorSource = Arc<dyn AdvisorSource>;

/// Advisor reached over HTTP: `POST {url}` with the context as JSON body.
pub struct HttpAdvisorSource {
    client: Client,
    url: String,
}

impl HttpAdvisorSource {
    pub fn new(url: &str, config: &AdvisorConfig) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BrokerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Build from config; `None` when no advisor is configured.
    pub fn from_config(config: &AdvisorConfig) -> BrokerResult<Option<Self>> {
        config
            .url
            .as_deref()
            .map(|url| Self::new(url, config))
            .transpose()
    }

    async fn request(&self, context: Value) -> BrokerResult<String> {
        debug!(url = %self.url, "Requesting advisor decision");
        let response = self
            .client
            .post(&self.url)
            .json(&context)
            .send()
            .await
            .map_err(|e| BrokerError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::HttpClient(format!("advisor returned HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| BrokerError::HttpClient(format!("Failed to read response: {e}")))
    }
}

impl AdvisorSource for HttpAdvisorSource {
    fn advise(&self, context: Value) -> BoxFuture<'_, BrokerResult<String>> {
        Box::pin(self.request(context))
    }
}

/// Canned advisor replies, for testing.
#[derive(Debug, Default)]
pub struct MockAdvisorSource {
    reply: Mutex<Option<String>>,
    contexts: Mutex<Vec<Value>>,
}

impl MockAdvisorSource {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: Mutex::new(Some(reply.into())),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Contexts received so far.
    pub fn contexts(&self) -> Vec<Value> {
        self.contexts.lock().clone()
    }
}

impl AdvisorSource for MockAdvisorSource {
    fn advise(&self, context: Value) -> BoxFuture<'_, BrokerResult<String>> {
        Box::pin(async move {
            self.contexts.lock().push(context);
            self.reply
                .lock()
                .clone()
                .ok_or_else(|| BrokerError::HttpClient("advisor unavailable".to_string()))
        })
    }
}
