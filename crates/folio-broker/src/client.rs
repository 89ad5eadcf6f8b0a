//! HTTP client for the brokerage REST API.
//!
//! Every call carries the bearer credential, the app key pair and a
//! transaction id (`tr_id`) header. A response counts as success only when
//! the HTTP status is 200 and the body's `rt_cd` is `"0"`; otherwise the
//! brokerage message (`msg1`) is surfaced verbatim.

use crate::credential::DynCredentialProvider;
use crate::error::{BrokerError, BrokerResult};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Brokerage endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Environment variable holding the app key.
    #[serde(default = "default_app_key_env")]
    pub app_key_env: String,
    #[serde(default = "default_app_secret_env")]
    pub app_secret_env: String,
    #[serde(default = "default_account_no_env")]
    pub account_no_env: String,
    #[serde(default = "default_account_product_env")]
    pub account_product_env: String,
}

fn default_base_url() -> String {
    "https://openapi.koreainvestment.com:9443".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_app_key_env() -> String {
    "FOLIO_APP_KEY".to_string()
}

fn default_app_secret_env() -> String {
    "FOLIO_APP_SECRET".to_string()
}

fn default_account_no_env() -> String {
    "FOLIO_ACCOUNT_NO".to_string()
}

fn default_account_product_env() -> String {
    "FOLIO_ACCOUNT_PRODUCT".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            app_key_env: default_app_key_env(),
            app_secret_env: default_app_secret_env(),
            account_no_env: default_account_no_env(),
            account_product_env: default_account_product_env(),
        }
    }
}

/// App key pair and account identifiers. Never logged.
#[derive(Clone)]
pub struct AccountCredentials {
    pub app_key: String,
    pub app_secret: String,
    pub account_no: String,
    pub account_product: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("app_key", &"<redacted>")
            .field("app_secret", &"<redacted>")
            .field("account_no", &"<redacted>")
            .field("account_product", &self.account_product)
            .finish()
    }
}

impl AccountCredentials {
    /// Read the variables named in `config`.
    pub fn from_env(config: &BrokerConfig) -> BrokerResult<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| BrokerError::MissingEnv(name.to_string()))
        };
        Ok(Self {
            app_key: read(&config.app_key_env)?,
            app_secret: read(&config.app_secret_env)?,
            account_no: read(&config.account_no_env)?,
            account_product: read(&config.account_product_env)?,
        })
    }
}

/// Client for the brokerage REST API.
pub struct BrokerClient {
    client: Client,
    base_url: String,
    account: AccountCredentials,
    credentials: DynCredentialProvider,
}

impl BrokerClient {
    pub fn new(
        config: &BrokerConfig,
        account: AccountCredentials,
        credentials: DynCredentialProvider,
    ) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BrokerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account,
            credentials,
        })
    }

    pub fn account(&self) -> &AccountCredentials {
        &self.account
    }

    /// Account number and product code, the first two fields of every request.
    pub fn account_fields(&self) -> [(&'static str, String); 2] {
        [
            ("CANO", self.account.account_no.clone()),
            ("ACNT_PRDT_CD", self.account.account_product.clone()),
        ]
    }

    /// Whether a bearer credential can currently be obtained.
    pub async fn credential_available(&self) -> bool {
        self.credentials.bearer().await.is_ok()
    }

    async fn authorized(&self, builder: RequestBuilder, tr_id: &str) -> BrokerResult<RequestBuilder> {
        let token = self.credentials.bearer().await?;
        Ok(builder
            .header("content-type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", &self.account.app_key)
            .header("appsecret", &self.account.app_secret)
            .header("tr_id", tr_id)
            .header("custtype", "P"))
    }

    /// GET `path` with query parameters.
    pub async fn get(&self, path: &str, tr_id: &str, params: &[(&str, String)]) -> BrokerResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, tr_id, "Brokerage GET");
        let request = self.authorized(self.client.get(&url).query(params), tr_id).await?;
        self.execute(request).await
    }

    /// POST `path` with a JSON body.
    pub async fn post(&self, path: &str, tr_id: &str, body: &Value) -> BrokerResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, tr_id, "Brokerage POST");
        let request = self.authorized(self.client.post(&url).json(body), tr_id).await?;
        self.execute(request).await
    }

    async fn execute(&self, request: RequestBuilder) -> BrokerResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| BrokerError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BrokerError::HttpClient(format!("Failed to read response: {e}")))?;

        check_response(status, &text)
    }
}

/// Apply the success rule to a raw response.
///
/// 5xx without a parsable body is a transport failure; anything else that
/// fails the rule is a business rejection carrying `msg1`.
pub fn check_response(status: StatusCode, text: &str) -> BrokerResult<Value> {
    let body: Value = match serde_json::from_str(text) {
        Ok(body) => body,
        Err(_) if status.is_server_error() => {
            return Err(BrokerError::HttpClient(format!("HTTP {status}")));
        }
        Err(e) => {
            return Err(BrokerError::ParseError(format!("HTTP {status}: {e}")));
        }
    };

    let rt_cd = body.get("rt_cd").and_then(Value::as_str).unwrap_or_default();
    if status == StatusCode::OK && rt_cd == "0" {
        return Ok(body);
    }

    let message = body
        .get("msg1")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .trim()
        .to_string();
    let code = body
        .get("msg_cd")
        .and_then(Value::as_str)
        .unwrap_or(rt_cd)
        .to_string();
    warn!(%status, %code, %message, "Brokerage rejected request");
    Err(BrokerError::Api { code, message })
}

/// String field, empty when missing.
pub fn field_str<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Parse an integer field, treating missing or empty values as 0.
pub fn field_u64(item: &Value, key: &str) -> u64 {
    match item.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|v| v.max(0.0) as u64).unwrap_or(0),
        _ => 0,
    }
}

/// Parse a decimal field, treating missing or empty values as 0.
pub fn field_decimal(item: &Value, key: &str) -> rust_decimal::Decimal {
    use std::str::FromStr;
    match item.get(key) {
        Some(Value::String(s)) => rust_decimal::Decimal::from_str(s.trim()).unwrap_or_default(),
        Some(Value::Number(n)) => rust_decimal::Decimal::from_str(&n.to_string()).unwrap_or_default(),
        _ => rust_decimal::Decimal::ZERO,
    }
}

/// Parse a float field, treating missing or empty values as 0.
pub fn field_f64(item: &Value, key: &str) -> f64 {
    match item.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
