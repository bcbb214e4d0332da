//! Typed payloads for each push event kind

use serde::{Deserialize, Serialize};

use crate::websocket::EventKind;

/// Payload types that can be decoded from an event's `data`
pub trait EventPayload: for<'de> Deserialize<'de> + Send + 'static {
    const KIND: EventKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlightStatus {
    Scheduled,
    Boarding,
    Departed,
    Delayed,
    Cancelled,
    Arrived,
    Diverted,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightUpdate {
    pub flight_id: String,
    pub status: FlightStatus,
    /// Delay in minutes
    #[serde(default)]
    pub delay: Option<u32>,
    #[serde(default)]
    pub gate: Option<String>,
}

impl EventPayload for FlightUpdate {
    const KIND: EventKind = EventKind::FlightUpdate;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DutyState {
    Available,
    OnDuty,
    Resting,
    Sick,
    OffDuty,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewStatusUpdate {
    pub crew_id: String,
    pub status: DutyState,
    #[serde(default)]
    pub location: Option<String>,
}

impl EventPayload for CrewStatusUpdate {
    const KIND: EventKind = EventKind::CrewStatusUpdate;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionAlert {
    #[serde(default)]
    pub id: Option<String>,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(default)]
    pub affected_crew: u32,
    #[serde(default)]
    pub message: Option<String>,
}

impl EventPayload for DisruptionAlert {
    const KIND: EventKind = EventKind::DisruptionAlert;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyTimeWarning {
    pub crew_id: String,
    pub duty_hours: f64,
    #[serde(default)]
    pub limit: Option<f64>,
    pub risk_level: Severity,
}

impl EventPayload for DutyTimeWarning {
    const KIND: EventKind = EventKind::DutyTimeWarning;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalloutState {
    Pending,
    Accepted,
    Declined,
    Expired,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveCallout {
    pub reserve_id: String,
    pub status: CalloutState,
    #[serde(default)]
    pub flight_id: Option<String>,
}

impl EventPayload for ReserveCallout {
    const KIND: EventKind = EventKind::ReserveCallout;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
}

impl EventPayload for ConnectionStatus {
    const KIND: EventKind = EventKind::ConnectionStatus;
}
