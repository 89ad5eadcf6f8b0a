//! Application configuration.
//!
//! Two documents: `ManagerConfig` for the portfolio manager (decision and risk
//! loops) and `ExecutionConfig` for the execution service. Both are TOML with
//! every field defaulted, so an empty file is a valid configuration.

use crate::error::{AppError, AppResult};
use folio_broker::{AdvisorConfig, AuthConfig, BrokerConfig, CandidatesConfig, SignalsConfig};
use folio_core::{Constraints, MarketHours};
use folio_dashboard::DashboardConfig;
use folio_decision::DecisionConfig;
use folio_executor::{ExecutorConfig, OrderLimits, ServerConfig};
use folio_persistence::PersistenceConfig;
use folio_risk::RiskConfig;
use folio_ws::ChannelConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Env var overriding the config path.
pub const CONFIG_ENV: &str = "FOLIO_CONFIG";
pub const DEFAULT_MANAGER_CONFIG: &str = "config/default.toml";
pub const DEFAULT_EXECUTION_CONFIG: &str = "config/execution.toml";

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Orders go to the in-process paper broker.
    #[default]
    Paper,
    /// Orders go to the brokerage transaction API.
    Live,
}

/// Loop cadence and trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_decision_interval_secs")]
    pub decision_interval_secs: u64,
    /// Run the first decision cycle immediately instead of after one interval.
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
    #[serde(default)]
    pub market_hours: MarketHours,
}

fn default_decision_interval_secs() -> u64 {
    1800
}

fn default_run_on_start() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            decision_interval_secs: default_decision_interval_secs(),
            run_on_start: default_run_on_start(),
            market_hours: MarketHours::default(),
        }
    }
}

impl ScheduleConfig {
    pub fn decision_interval(&self) -> Duration {
        Duration::from_secs(self.decision_interval_secs.max(1))
    }
}

/// Restart policy for the background loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Restarts allowed before the loop is given up on.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Consecutive aborted cycles after which every further failure raises
    /// an alert. The loop itself keeps running.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_max_restarts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

/// Portfolio manager configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub dispatcher: ChannelConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub candidates: CandidatesConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl ManagerConfig {
    pub fn from_file(path: &str) -> AppResult<Self> {
        read_toml(path)
    }

    /// Reject values the loops cannot work with.
    pub fn validate(&self) -> AppResult<()> {
        self.decision
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        self.constraints
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        self.risk
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        self.schedule
            .market_hours
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        if self.dispatcher.url.is_empty() {
            return Err(AppError::Config("dispatcher.url must be set".to_string()));
        }
        Ok(())
    }
}

/// Execution service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: OperatingMode,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub limits: OrderLimits,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl ExecutionConfig {
    pub fn from_file(path: &str) -> AppResult<Self> {
        read_toml(path)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.executor.max_attempts == 0 {
            return Err(AppError::Config(
                "executor.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config path: CLI arg > `FOLIO_CONFIG` > `default`.
pub fn resolve_config_path(cli: Option<String>, default: &str) -> String {
    cli.or_else(|| std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty()))
        .unwrap_or_else(|| default.to_string())
}

/// Load a config document, falling back to defaults when the file is missing.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &str) -> AppResult<T> {
    if Path::new(path).exists() {
        read_toml(path)
    } else {
        tracing::warn!(path = %path, "Config file not found, using defaults");
        Ok(T::default())
    }
}

fn read_toml<T: DeserializeOwned>(path: &str) -> AppResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

    toml::from_str(&content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_document_is_all_defaults() {
        let config: ManagerConfig = toml::from_str("").unwrap();
        assert_eq!(config.decision.signal_threshold, 0.1);
        assert_eq!(config.constraints.min_order_notional, dec!(100000));
        assert_eq!(config.risk.stop_loss_threshold, -0.05);
        assert_eq!(config.schedule.decision_interval_secs, 1800);
        assert_eq!(config.supervisor.max_restarts, 5);
        assert_eq!(config.dashboard.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config: ManagerConfig = toml::from_str(
            r#"
            [constraints]
            max_buy_candidates = 1

            [schedule.market_hours]
            close_hour = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.constraints.max_buy_candidates, 1);
        assert_eq!(config.constraints.max_sell_candidates, 3);
        assert_eq!(config.schedule.market_hours.close_hour, 16);
        assert_eq!(config.schedule.market_hours.open_hour, 9);
    }

    #[test]
    fn test_invalid_risk_threshold_rejected() {
        let config: ManagerConfig = toml::from_str("[risk]\nstop_loss_threshold = 0.1\n").unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_execution_defaults() {
        let config: ExecutionConfig = toml::from_str("mode = \"live\"\n").unwrap();
        assert_eq!(config.mode, OperatingMode::Live);
        assert_eq!(config.server.bind, "0.0.0.0:8005");
        assert_eq!(config.executor.max_attempts, 3);
        assert!(config.limits.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipped_configs_parse() {
        let manager: ManagerConfig =
            toml::from_str(include_str!("../../../config/default.toml")).unwrap();
        assert!(manager.validate().is_ok());
        let execution: ExecutionConfig =
            toml::from_str(include_str!("../../../config/execution.toml")).unwrap();
        assert_eq!(execution.mode, OperatingMode::Paper);
        assert!(execution.validate().is_ok());
    }

    #[test]
    fn test_cli_path_wins() {
        assert_eq!(
            resolve_config_path(Some("custom.toml".to_string()), DEFAULT_MANAGER_CONFIG),
            "custom.toml"
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config: ExecutionConfig = load_or_default("does/not/exist.toml").unwrap();
        assert_eq!(config.mode, OperatingMode::Paper);
    }
}
