//! Decision engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{DecisionError, DecisionResult};

/// Where per-ticker intents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    /// Classify the aggregated signal against `signal_threshold`.
    #[default]
    Signals,
    /// Use the external advisor's validated decision document.
    Advisor,
}

/// Configuration for the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// |average| must exceed this to produce a BUY or SELL bias.
    #[serde(default = "default_signal_threshold")]
    pub signal_threshold: f64,
    /// Target cash ratio reported when no signal is available.
    #[serde(default = "default_no_signal_cash_ratio")]
    pub no_signal_cash_ratio: f64,
    #[serde(default)]
    pub source: DecisionSource,
}

fn default_signal_threshold() -> f64 {
    0.1
}

fn default_no_signal_cash_ratio() -> f64 {
    0.5
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            signal_threshold: default_signal_threshold(),
            no_signal_cash_ratio: default_no_signal_cash_ratio(),
            source: DecisionSource::default(),
        }
    }
}

impl DecisionConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> DecisionResult<()> {
        if !(self.signal_threshold.is_finite() && self.signal_threshold >= 0.0) {
            return Err(DecisionError::ConfigError(format!(
                "signal_threshold ({}) must be a non-negative number",
                self.signal_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.no_signal_cash_ratio) {
            return Err(DecisionError::ConfigError(format!(
                "no_signal_cash_ratio ({}) must be in [0, 1]",
                self.no_signal_cash_ratio
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = DecisionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source, DecisionSource::Signals);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = DecisionConfig {
            signal_threshold: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
