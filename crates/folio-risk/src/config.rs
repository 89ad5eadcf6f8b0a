//! Risk monitor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// Exit thresholds and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Exit when `profit_loss_rate <= stop_loss_threshold` (negative fraction).
    #[serde(default = "default_stop_loss")]
    pub stop_loss_threshold: f64,
    /// Exit when `profit_loss_rate >= take_profit_threshold` (positive fraction).
    #[serde(default = "default_take_profit")]
    pub take_profit_threshold: f64,
    /// Volume ratio at or above which the market counts as busy.
    #[serde(default = "default_volume_high_ratio")]
    pub volume_high_ratio: f64,
    #[serde(default = "default_high_volume_interval_secs")]
    pub high_volume_interval_secs: u64,
    #[serde(default = "default_normal_interval_secs")]
    pub normal_interval_secs: u64,
    /// Ticker whose volume stands in for the market.
    #[serde(default = "default_volume_ticker")]
    pub volume_ticker: String,
}

fn default_stop_loss() -> f64 {
    -0.05
}

fn default_take_profit() -> f64 {
    0.15
}

fn default_volume_high_ratio() -> f64 {
    1.5
}

fn default_high_volume_interval_secs() -> u64 {
    300
}

fn default_normal_interval_secs() -> u64 {
    600
}

fn default_volume_ticker() -> String {
    "005930".to_string()
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_threshold: default_stop_loss(),
            take_profit_threshold: default_take_profit(),
            volume_high_ratio: default_volume_high_ratio(),
            high_volume_interval_secs: default_high_volume_interval_secs(),
            normal_interval_secs: default_normal_interval_secs(),
            volume_ticker: default_volume_ticker(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.stop_loss_threshold.is_nan() || self.stop_loss_threshold >= 0.0 {
            return Err(RiskError::ConfigError(format!(
                "stop_loss_threshold must be negative, got {}",
                self.stop_loss_threshold
            )));
        }
        if self.take_profit_threshold.is_nan() || self.take_profit_threshold <= 0.0 {
            return Err(RiskError::ConfigError(format!(
                "take_profit_threshold must be positive, got {}",
                self.take_profit_threshold
            )));
        }
        if self.high_volume_interval_secs == 0 || self.normal_interval_secs == 0 {
            return Err(RiskError::ConfigError("intervals must be positive".to_string()));
        }
        Ok(())
    }

    /// Next cycle delay for the observed volume level.
    #[must_use]
    pub fn interval_for(&self, high_volume: bool) -> Duration {
        if high_volume {
            Duration::from_secs(self.high_volume_interval_secs)
        } else {
            Duration::from_secs(self.normal_interval_secs)
        }
    }
}
