//! Bearer credential supply.
//!
//! Token issuance happens in a separate auth agent; this module only fetches
//! the current token and caches it in an explicitly owned [`CredentialCache`].

use crate::error::{BrokerError, BrokerResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use folio_core::BoxFuture;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Auth agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the auth agent.
    #[serde(default = "default_auth_url")]
    pub url: String,
    /// Refetch when the cached token expires within this many seconds.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
    #[serde(default = "default_auth_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Cache lifetime for tokens without a reported expiry.
    #[serde(default = "default_fallback_ttl_secs")]
    pub fallback_ttl_secs: i64,
}

fn default_auth_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_refresh_margin_secs() -> i64 {
    300
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_fallback_ttl_secs() -> i64 {
    3_600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: default_auth_url(),
            refresh_margin_secs: default_refresh_margin_secs(),
            request_timeout_ms: default_auth_timeout_ms(),
            fallback_ttl_secs: default_fallback_ttl_secs(),
        }
    }
}

/// A bearer token and its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of the brokerage bearer token.
pub trait CredentialProvider: Send + Sync {
    /// Current token, refreshed if needed.
    fn bearer(&self) -> BoxFuture<'_, BrokerResult<String>>;
}

/// Arc wrapper for CredentialProvider trait objects.
pub type DynCredentialProvider = Arc<dyn CredentialProvider>;

/// Cached credential with a refresh margin.
#[derive(Debug)]
pub struct CredentialCache {
    current: RwLock<Option<Credential>>,
    refresh_margin: ChronoDuration,
}

impl CredentialCache {
    pub fn new(refresh_margin_secs: i64) -> Self {
        Self {
            current: RwLock::new(None),
            refresh_margin: ChronoDuration::seconds(refresh_margin_secs),
        }
    }

    /// Cached token if it is still outside the refresh margin at `now`.
    pub fn valid_at(&self, now: DateTime<Utc>) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .filter(|c| c.expires_at - self.refresh_margin > now)
            .map(|c| c.token.clone())
    }

    pub fn store(&self, credential: Credential) {
        *self.current.write() = Some(credential);
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

/// Auth agent response: `{token, token_type?, expires_at?}`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    expires_at: Option<String>,
}

/// Fetches the token from the auth agent (`GET {url}/result/auth-token`).
pub struct HttpCredentialProvider {
    client: Client,
    url: String,
    fallback_ttl: ChronoDuration,
    cache: CredentialCache,
}

impl HttpCredentialProvider {
    pub fn new(config: &AuthConfig) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BrokerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/result/auth-token", config.url.trim_end_matches('/')),
            fallback_ttl: ChronoDuration::seconds(config.fallback_ttl_secs),
            cache: CredentialCache::new(config.refresh_margin_secs),
        })
    }

    async fn fetch(&self) -> BrokerResult<Credential> {
        debug!(url = %self.url, "Fetching bearer credential");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| BrokerError::Credential(format!("auth agent unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::Credential(format!("auth agent returned HTTP {status}")));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::Credential(format!("invalid auth response: {e}")))?;

        if body.token.is_empty() {
            return Err(BrokerError::Credential("auth agent returned an empty token".to_string()));
        }

        let expires_at = body
            .expires_at
            .as_deref()
            .and_then(parse_expiry)
            .unwrap_or_else(|| Utc::now() + self.fallback_ttl);

        Ok(Credential {
            token: body.token,
            expires_at,
        })
    }
}

/// Accept RFC 3339 or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl CredentialProvider for HttpCredentialProvider {
    fn bearer(&self) -> BoxFuture<'_, BrokerResult<String>> {
        Box::pin(async move {
            if let Some(token) = self.cache.valid_at(Utc::now()) {
                return Ok(token);
            }

            match self.fetch().await {
                Ok(credential) => {
                    info!(expires_at = %credential.expires_at, "Bearer credential refreshed");
                    let token = credential.token.clone();
                    self.cache.store(credential);
                    Ok(token)
                }
                Err(e) => {
                    warn!(error = %e, "Credential refresh failed");
                    self.cache.clear();
                    Err(e)
                }
            }
        })
    }
}

/// Fixed token, for paper trading and tests.
pub struct StaticCredentialProvider {
    token: String,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn bearer(&self) -> BoxFuture<'_, BrokerResult<String>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 9, h, m, 0).unwrap()
    }

    #[test]
    fn test_cache_respects_refresh_margin() {
        let cache = CredentialCache::new(300);
        cache.store(Credential {
            token: "abc".to_string(),
            expires_at: at(10, 0),
        });

        assert_eq!(cache.valid_at(at(9, 54)).as_deref(), Some("abc"));
        // Inside the 5 minute margin
        assert_eq!(cache.valid_at(at(9, 56)), None);
    }

    #[test]
    fn test_cache_empty_until_stored() {
        let cache = CredentialCache::new(0);
        assert_eq!(cache.valid_at(at(0, 0)), None);
    }

    #[test]
    fn test_parse_expiry_formats() {
        assert_eq!(parse_expiry("2026-02-09T10:00:00Z"), Some(at(10, 0)));
        assert_eq!(parse_expiry("2026-02-09 10:00:00"), Some(at(10, 0)));
        assert_eq!(parse_expiry("tomorrow"), None);
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let c = Credential {
            token: "secret-token".to_string(),
            expires_at: at(10, 0),
        };
        assert!(!format!("{c:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticCredentialProvider::new("paper");
        assert_eq!(provider.bearer().await.unwrap(), "paper");
    }
}
