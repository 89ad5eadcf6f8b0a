//! Frames exchanged on the order channel.
//!
//! Besides `OrderMessage` (client to server) and `OrderOutcome` (server to
//! client), either side may send small control frames tagged by `type`.

use folio_core::OrderOutcome;
use serde::{Deserialize, Serialize};

use crate::error::{WsError, WsResult};

/// Application-level keepalive frame: `{"type":"ping"}` / `{"type":"pong"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    Ping,
    Pong,
}

impl ControlFrame {
    /// Serialized form, ready to send as a text frame.
    pub fn to_text(self) -> String {
        match self {
            Self::Ping => r#"{"type":"ping"}"#.to_string(),
            Self::Pong => r#"{"type":"pong"}"#.to_string(),
        }
    }
}

/// A text frame received by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Control(ControlFrame),
    Outcome(OrderOutcome),
}

/// Classify an inbound text frame.
///
/// Frames carrying a `type` field are control frames; anything else must be
/// an `OrderOutcome`.
pub fn parse_inbound(text: &str) -> WsResult<InboundFrame> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    if value.get("type").is_some() {
        let control: ControlFrame = serde_json::from_value(value)
            .map_err(|e| WsError::ParseError(format!("unknown control frame: {e}")))?;
        return Ok(InboundFrame::Control(control));
    }

    let outcome: OrderOutcome = serde_json::from_value(value)
        .map_err(|e| WsError::ParseError(format!("not an order outcome: {e}")))?;
    Ok(InboundFrame::Outcome(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::OutcomeStatus;

    #[test]
    fn test_parse_ping() {
        assert_eq!(
            parse_inbound(r#"{"type":"ping"}"#).unwrap(),
            InboundFrame::Control(ControlFrame::Ping)
        );
        assert_eq!(
            parse_inbound(&ControlFrame::Pong.to_text()).unwrap(),
            InboundFrame::Control(ControlFrame::Pong)
        );
    }

    #[test]
    fn test_parse_outcome() {
        let text = r#"{"request_id":"r-1","status":"success","order_no":"0000117","message":"ok"}"#;
        match parse_inbound(text).unwrap() {
            InboundFrame::Outcome(o) => {
                assert_eq!(o.status, OutcomeStatus::Success);
                assert_eq!(o.broker_order_id.as_deref(), Some("0000117"));
            }
            other => panic!("expected outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_control_rejected() {
        assert!(matches!(
            parse_inbound(r#"{"type":"subscribe"}"#),
            Err(WsError::ParseError(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"hello":"world"}"#).is_err());
    }
}
