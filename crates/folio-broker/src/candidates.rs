//! Candidate tickers and their current prices.
//!
//! Candidates come from `POST {url}/api/candidates {top_n}`; prices from
//! `POST {price_url}/result/analysis {ticker}` (`current_price`). Both sources
//! are optional: without them the universe is just the current holdings.

use crate::client::field_decimal;
use crate::error::{BrokerError, BrokerResult};
use folio_core::BoxFuture;
use parking_lot::Mutex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Candidate and price source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatesConfig {
    /// Candidate selector base URL. Disabled when absent.
    #[serde(default)]
    pub url: Option<String>,
    /// Price/analysis service base URL.
    #[serde(default)]
    pub price_url: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_top_n() -> usize {
    5
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for CandidatesConfig {
    fn default() -> Self {
        Self {
            url: None,
            price_url: None,
            top_n: default_top_n(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// A ticker proposed for the universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    #[serde(default)]
    top_candidates: Vec<Candidate>,
}

/// Candidate tickers and prices.
pub trait CandidateSource: Send + Sync {
    /// Up to `top_n` candidates; empty when the source is unavailable.
    fn candidates(&self) -> BoxFuture<'_, Vec<Candidate>>;

    /// Current price of `ticker`.
    fn price<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<Decimal>>;
}

/// Arc wrapper for CandidateSource trait objects.
pub type DynCandidateSource = Arc<dyn CandidateSource>;

/// HTTP candidate and price source.
pub struct HttpCandidateSource {
    client: Client,
    config: CandidatesConfig,
}

impl HttpCandidateSource {
    pub fn new(config: CandidatesConfig) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BrokerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn post_json(&self, url: String, body: Value) -> BrokerResult<Value> {
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::HttpClient(format!("HTTP request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::HttpClient(format!("HTTP {status} from {url}")));
        }
        response
            .json()
            .await
            .map_err(|e| BrokerError::ParseError(format!("invalid response from {url}: {e}")))
    }

    async fn fetch_candidates(&self) -> Vec<Candidate> {
        let Some(base) = self.config.url.as_deref() else {
            return Vec::new();
        };
        let url = format!("{}/api/candidates", base.trim_end_matches('/'));
        let result = self
            .post_json(url, json!({ "top_n": self.config.top_n }))
            .await
            .and_then(|v| serde_json::from_value::<CandidatesResponse>(v).map_err(Into::into));

        match result {
            Ok(mut response) => {
                response.top_candidates.truncate(self.config.top_n);
                debug!(count = response.top_candidates.len(), "Candidates fetched");
                response.top_candidates
            }
            Err(e) => {
                warn!(error = %e, "Failed to get candidate tickers");
                Vec::new()
            }
        }
    }

    async fn fetch_price(&self, ticker: &str) -> BrokerResult<Decimal> {
        let base = self
            .config
            .price_url
            .as_deref()
            .ok_or_else(|| BrokerError::ParseError("no price source configured".to_string()))?;
        let url = format!("{}/result/analysis", base.trim_end_matches('/'));
        let body = self.post_json(url, json!({ "ticker": ticker })).await?;
        Ok(field_decimal(&body, "current_price"))
    }
}

impl CandidateSource for HttpCandidateSource {
    fn candidates(&self) -> BoxFuture<'_, Vec<Candidate>> {
        Box::pin(self.fetch_candidates())
    }

    fn price<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<Decimal>> {
        Box::pin(self.fetch_price(ticker))
    }
}

/// Fixed candidates and prices, for testing.
#[derive(Debug, Default)]
pub struct MockCandidateSource {
    candidates: Mutex<Vec<Candidate>>,
    prices: Mutex<HashMap<String, Decimal>>,
}

impl MockCandidateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, ticker: &str, price: Decimal) {
        self.candidates.lock().push(Candidate {
            ticker: ticker.to_string(),
            name: String::new(),
        });
        self.prices.lock().insert(ticker.to_string(), price);
    }
}

impl CandidateSource for MockCandidateSource {
    fn candidates(&self) -> BoxFuture<'_, Vec<Candidate>> {
        Box::pin(async move { self.candidates.lock().clone() })
    }

    fn price<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<Decimal>> {
        Box::pin(async move {
            self.prices
                .lock()
                .get(ticker)
                .copied()
                .ok_or_else(|| BrokerError::ParseError(format!("no price for {ticker}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use rust_decimal_macros::dec;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_candidates_and_price() {
        let base = serve(
            Router::new()
                .route(
                    "/api/candidates",
                    post(|| async {
                        Json(json!({
                            "timestamp": "2026-02-09T00:00:00",
                            "top_candidates": [
                                {"ticker": "005930", "name": "삼성전자", "sector": "IT"},
                                {"ticker": "000660", "name": "SK하이닉스", "sector": "IT"},
                                {"ticker": "035420", "name": "NAVER", "sector": "IT"}
                            ]
                        }))
                    }),
                )
                .route(
                    "/result/analysis",
                    post(|Json(body): Json<Value>| async move {
                        let price = if body["ticker"] == "005930" { 70000 } else { 0 };
                        Json(json!({"ticker": body["ticker"], "current_price": price}))
                    }),
                ),
        )
        .await;

        let source = HttpCandidateSource::new(CandidatesConfig {
            url: Some(base.clone()),
            price_url: Some(base),
            top_n: 2,
            request_timeout_ms: 1_000,
        })
        .unwrap();

        let candidates = source.candidates().await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].ticker, "005930");

        assert_eq!(source.price("005930").await.unwrap(), dec!(70000));
        assert_eq!(source.price("000660").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_disabled_source_is_empty() {
        let source = HttpCandidateSource::new(CandidatesConfig::default()).unwrap();
        assert!(source.candidates().await.is_empty());
        assert!(source.price("005930").await.is_err());
    }
}
