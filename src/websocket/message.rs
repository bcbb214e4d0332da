use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RealtimeError, Result};

/// Type tag of the client keep-alive frame
pub const PING_TYPE: &str = "ping";

/// Type tag the server may use to answer pings
pub const PONG_TYPE: &str = "pong";

/// Closed set of event kinds pushed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    FlightUpdate,
    CrewStatusUpdate,
    DisruptionAlert,
    DutyTimeWarning,
    ReserveCallout,
    ConnectionStatus,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::FlightUpdate,
        EventKind::CrewStatusUpdate,
        EventKind::DisruptionAlert,
        EventKind::DutyTimeWarning,
        EventKind::ReserveCallout,
        EventKind::ConnectionStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FlightUpdate => "flight-update",
            EventKind::CrewStatusUpdate => "crew-status-update",
            EventKind::DisruptionAlert => "disruption-alert",
            EventKind::DutyTimeWarning => "duty-time-warning",
            EventKind::ReserveCallout => "reserve-callout",
            EventKind::ConnectionStatus => "connection-status",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RealtimeError::InvalidFrame(format!("unknown event type '{}'", s)))
    }
}

/// A parsed inbound frame, ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl UpdateEvent {
    /// Locally synthesized `connection-status` event
    pub fn connection_status(connected: bool) -> Self {
        Self {
            kind: EventKind::ConnectionStatus,
            timestamp: Utc::now(),
            data: serde_json::json!({ "connected": connected }),
        }
    }
}

/// Wire shape of an inbound frame before validation
#[derive(Debug, Deserialize)]
struct RawInboundFrame {
    #[serde(rename = "type")]
    kind: String,
    timestamp: Option<Value>,
    #[serde(default)]
    data: Value,
}

/// Outcome of decoding one inbound text frame
#[derive(Debug)]
pub enum InboundFrame {
    Event(UpdateEvent),
    /// Server keep-alive answer
    Pong,
    /// Well-formed frame with a type outside the closed set
    Unknown(String),
}

impl InboundFrame {
    /// Decode a text frame. Malformed JSON, a missing or unparseable
    /// timestamp all fail the whole frame.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawInboundFrame = serde_json::from_str(text)?;

        if raw.kind == PONG_TYPE {
            return Ok(InboundFrame::Pong);
        }

        let kind = match raw.kind.parse::<EventKind>() {
            Ok(kind) => kind,
            Err(_) => return Ok(InboundFrame::Unknown(raw.kind)),
        };

        let timestamp = raw
            .timestamp
            .as_ref()
            .ok_or_else(|| RealtimeError::InvalidFrame("missing timestamp".to_string()))
            .and_then(parse_timestamp)?;

        Ok(InboundFrame::Event(UpdateEvent {
            kind,
            timestamp,
            data: raw.data,
        }))
    }
}

/// Accepts RFC 3339 strings and epoch-millisecond numbers
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RealtimeError::InvalidFrame(format!("bad timestamp '{}': {}", s, e))),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| RealtimeError::InvalidFrame(format!("bad timestamp {}", n))),
        other => Err(RealtimeError::InvalidFrame(format!(
            "bad timestamp {}",
            other
        ))),
    }
}

/// Frame sent from client to server
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl OutboundFrame {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn ping() -> Self {
        Self::new(
            PING_TYPE,
            serde_json::json!({ "timestamp": Utc::now().timestamp_millis() }),
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flight_update() {
        let text = r#"{
            "type": "flight-update",
            "timestamp": "2024-03-01T08:15:00Z",
            "data": {"flightId": "AA100", "status": "delayed", "delay": 45}
        }"#;

        match InboundFrame::parse(text).unwrap() {
            InboundFrame::Event(event) => {
                assert_eq!(event.kind, EventKind::FlightUpdate);
                assert_eq!(event.timestamp.to_rfc3339(), "2024-03-01T08:15:00+00:00");
                assert_eq!(event.data["flightId"], "AA100");
            }
            other => panic!("Expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_epoch_millis_timestamp() {
        let text = r#"{"type":"reserve-callout","timestamp":1709280900000,"data":{}}"#;
        match InboundFrame::parse(text).unwrap() {
            InboundFrame::Event(event) => {
                assert_eq!(event.timestamp.timestamp_millis(), 1_709_280_900_000);
            }
            other => panic!("Expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let text = r#"{"type":"gate-change","timestamp":"2024-03-01T08:15:00Z","data":{}}"#;
        assert!(matches!(
            InboundFrame::parse(text).unwrap(),
            InboundFrame::Unknown(kind) if kind == "gate-change"
        ));
    }

    #[test]
    fn test_missing_timestamp_fails() {
        let text = r#"{"type":"duty-time-warning","data":{"crewId":"C1"}}"#;
        assert!(matches!(
            InboundFrame::parse(text),
            Err(RealtimeError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_malformed_json_fails() {
        assert!(matches!(
            InboundFrame::parse("{not json"),
            Err(RealtimeError::Serialization(_))
        ));
        assert!(InboundFrame::parse(r#"{"type":"flight-update","timestamp":"yesterday"}"#).is_err());
    }

    #[test]
    fn test_pong_frame() {
        assert!(matches!(
            InboundFrame::parse(r#"{"type":"pong"}"#).unwrap(),
            InboundFrame::Pong
        ));
    }

    #[test]
    fn test_event_kind_wire_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                json!(kind.as_str())
            );
        }
    }

    #[test]
    fn test_ping_frame_shape() {
        let value: Value = serde_json::from_str(&OutboundFrame::ping().to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "ping");
        assert!(value["data"]["timestamp"].is_i64());
    }
}
