//! Signal samples from analysis providers and their aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One provider's current assessment.
///
/// `values` is never empty: empty payloads are rejected when the sample is
/// constructed or deserialized, so they never reach aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSignalSample")]
pub struct SignalSample {
    /// Provider identifier (usually its host).
    pub source_id: String,
    /// When the provider produced the assessment.
    pub timestamp: DateTime<Utc>,
    /// Normalized signal values, in provider order.
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSignalSample {
    source_id: String,
    timestamp: DateTime<Utc>,
    values: Vec<f64>,
}

impl TryFrom<RawSignalSample> for SignalSample {
    type Error = CoreError;

    fn try_from(raw: RawSignalSample) -> Result<Self> {
        Self::new(raw.source_id, raw.timestamp, raw.values)
    }
}

impl SignalSample {
    /// Create a sample, rejecting empty or non-finite value vectors.
    pub fn new(
        source_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let source_id = source_id.into();
        if values.is_empty() {
            return Err(CoreError::EmptySignal(source_id));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::EmptySignal(format!(
                "{source_id} (non-finite value)"
            )));
        }
        Ok(Self {
            source_id,
            timestamp,
            values,
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Mean and sum over every value of every current sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSignal {
    /// Number of samples that contributed.
    pub sample_count: usize,
    /// Number of flattened values.
    pub value_count: usize,
    pub average: f64,
    pub total: f64,
}

impl AggregatedSignal {
    /// Aggregate samples. Returns `None` ("no signal") when there are none.
    #[must_use]
    pub fn from_samples(samples: &[SignalSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let (total, value_count) = samples
            .iter()
            .flat_map(|s| s.values.iter())
            .fold((0.0_f64, 0usize), |(sum, n), v| (sum + v, n + 1));

        // Samples are non-empty by construction, so value_count > 0 here.
        Some(Self {
            sample_count: samples.len(),
            value_count,
            average: total / value_count as f64,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(values: Vec<f64>) -> SignalSample {
        SignalSample::new("agent-a", Utc::now(), values).unwrap()
    }

    #[test]
    fn test_empty_sample_rejected() {
        let err = SignalSample::new("agent-a", Utc::now(), vec![]).unwrap_err();
        assert!(matches!(err, CoreError::EmptySignal(_)));
    }

    #[test]
    fn test_nan_rejected() {
        assert!(SignalSample::new("agent-a", Utc::now(), vec![0.1, f64::NAN]).is_err());
    }

    #[test]
    fn test_deserialize_rejects_empty_values() {
        let json = r#"{"source_id":"x","timestamp":"2026-02-09T01:00:00Z","values":[]}"#;
        assert!(serde_json::from_str::<SignalSample>(json).is_err());

        let json = r#"{"source_id":"x","timestamp":"2026-02-09T01:00:00Z","values":[0.5]}"#;
        let parsed: SignalSample = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.values(), &[0.5]);
    }

    #[test]
    fn test_aggregate_none_without_samples() {
        assert!(AggregatedSignal::from_samples(&[]).is_none());
    }

    #[test]
    fn test_aggregate_flattens_across_samples() {
        let samples = vec![sample(vec![0.5, 0.7]), sample(vec![-0.2])];
        let agg = AggregatedSignal::from_samples(&samples).unwrap();

        assert_eq!(agg.sample_count, 2);
        assert_eq!(agg.value_count, 3);
        assert!((agg.total - 1.0).abs() < 1e-12);
        assert!((agg.average - 1.0 / 3.0).abs() < 1e-12);
    }
}
