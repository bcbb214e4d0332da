//! Typed event payloads and per-kind listener helpers.

pub mod listeners;
mod payloads;

pub use listeners::{
    listen, on_connection_status, on_crew_status_update, on_disruption_alert,
    on_duty_time_warning, on_event, on_flight_update, on_reserve_callout, EventListener,
};
pub use payloads::{
    CalloutState, ConnectionStatus, CrewStatusUpdate, DisruptionAlert, DutyState,
    DutyTimeWarning, EventPayload, FlightStatus, FlightUpdate, ReserveCallout, Severity,
};
