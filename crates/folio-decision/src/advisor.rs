//! Strict validation of advisor decision documents.
//!
//! The advisor returns free-form text that should contain one JSON document.
//! Nothing in it is trusted until the whole document has passed validation;
//! callers fall back to an all-HOLD decision on any error.

use std::collections::HashSet;

use folio_core::ActionKind;
use serde::{Deserialize, Serialize};

use crate::error::{DecisionError, DecisionResult};

/// Informational header. Not used for decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisorMeta {
    #[serde(default)]
    pub decision_time_utc: Option<String>,
    #[serde(default)]
    pub overall_comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    ReduceExposure,
    KeepExposure,
    IncreaseExposure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalView {
    pub macro_bias: String,
    pub risk_action: RiskAction,
    pub target_cash_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TickerDecision {
    pub ticker: String,
    pub action: ActionKind,
    pub target_weight: f64,
    pub priority: u32,
    pub strength: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorDecision {
    #[serde(default)]
    pub meta: AdvisorMeta,
    pub global_view: GlobalView,
    pub ticker_decisions: Vec<TickerDecision>,
}

/// Extract the JSON body from text that may be wrapped in a Markdown code fence.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // Skip an optional language tag on the fence line.
    let body = match after.find('\n') {
        Some(nl) if after[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => &after[nl + 1..],
        _ => after,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn unit_interval(name: &str, ticker: &str, value: f64) -> DecisionResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DecisionError::InvalidAdvisorPayload(format!(
            "{ticker}: {name} {value} outside [0, 1]"
        )))
    }
}

/// Parse and validate an advisor payload against the cycle's universe.
///
/// Rejects: malformed JSON, unknown fields in decisions, weights or strengths
/// outside `[0, 1]`, tickers outside the universe, and duplicate tickers.
pub fn parse_advisor_payload(raw: &str, universe: &[&str]) -> DecisionResult<AdvisorDecision> {
    let body = strip_code_fence(raw);
    let decision: AdvisorDecision = serde_json::from_str(body)?;

    unit_interval(
        "target_cash_ratio",
        "global_view",
        decision.global_view.target_cash_ratio,
    )?;

    let allowed: HashSet<&str> = universe.iter().copied().collect();
    let mut seen = HashSet::new();

    for d in &decision.ticker_decisions {
        if d.ticker.trim().is_empty() {
            return Err(DecisionError::InvalidAdvisorPayload(
                "empty ticker".to_string(),
            ));
        }
        if !allowed.contains(d.ticker.as_str()) {
            return Err(DecisionError::InvalidAdvisorPayload(format!(
                "{} is not in the universe",
                d.ticker
            )));
        }
        if !seen.insert(d.ticker.as_str()) {
            return Err(DecisionError::InvalidAdvisorPayload(format!(
                "duplicate decision for {}",
                d.ticker
            )));
        }
        unit_interval("target_weight", &d.ticker, d.target_weight)?;
        unit_interval("strength", &d.ticker, d.strength)?;
    }

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "meta": {"decision_time_utc": "2026-02-09T01:00:00Z", "overall_comment": "mild risk-on"},
        "global_view": {"macro_bias": "risk_on", "risk_action": "keep_exposure", "target_cash_ratio": 0.3},
        "ticker_decisions": [
            {"ticker": "005930", "action": "BUY", "target_weight": 0.15, "priority": 1, "strength": 0.8, "reason": "trend"},
            {"ticker": "000660", "action": "HOLD", "target_weight": 0.1, "priority": 2, "strength": 0.2, "reason": "flat"}
        ]
    }"#;

    const UNIVERSE: &[&str] = &["005930", "000660"];

    #[test]
    fn test_valid_payload() {
        let d = parse_advisor_payload(VALID, UNIVERSE).unwrap();
        assert_eq!(d.ticker_decisions.len(), 2);
        assert_eq!(d.ticker_decisions[0].action, ActionKind::Buy);
        assert_eq!(d.global_view.risk_action, RiskAction::KeepExposure);
    }

    #[test]
    fn test_code_fence_stripped() {
        let fenced = format!("Here you go:\n```json\n{VALID}\n```\n");
        assert!(parse_advisor_payload(&fenced, UNIVERSE).is_ok());

        let bare_fence = format!("```\n{VALID}\n```");
        assert!(parse_advisor_payload(&bare_fence, UNIVERSE).is_ok());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let bad = VALID.replace("\"BUY\"", "\"SHORT\"");
        assert!(parse_advisor_payload(&bad, UNIVERSE).is_err());
    }

    #[test]
    fn test_weight_out_of_range_rejected() {
        let bad = VALID.replace("\"target_weight\": 0.15", "\"target_weight\": 1.5");
        let err = parse_advisor_payload(&bad, UNIVERSE).unwrap_err();
        assert!(matches!(err, DecisionError::InvalidAdvisorPayload(_)));
    }

    #[test]
    fn test_ticker_outside_universe_rejected() {
        assert!(parse_advisor_payload(VALID, &["005930"]).is_err());
    }

    #[test]
    fn test_duplicate_ticker_rejected() {
        let bad = VALID.replace("000660", "005930");
        assert!(parse_advisor_payload(&bad, UNIVERSE).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let bad = VALID.replace("\"reason\": \"trend\"", "\"reason\": \"trend\", \"leverage\": 3");
        assert!(parse_advisor_payload(&bad, UNIVERSE).is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let bad = VALID.replace("\"priority\": 1, ", "");
        assert!(parse_advisor_payload(&bad, UNIVERSE).is_err());
    }

    #[test]
    fn test_not_json_rejected() {
        assert!(parse_advisor_payload("I cannot decide today.", UNIVERSE).is_err());
    }
}
