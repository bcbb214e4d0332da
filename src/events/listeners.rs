//! Scoped subscriptions for a single event kind.
//!
//! Each helper registers one callback with the [`ConnectionManager`] and
//! returns an [`EventListener`] guard; the registration lives exactly as long
//! as the guard. Typed helpers decode `data` first and log payloads that do
//! not decode instead of delivering them.

use crate::connection_manager::{ConnectionManager, Subscription};
use crate::websocket::{EventKind, UpdateEvent};

use super::payloads::{
    ConnectionStatus, CrewStatusUpdate, DisruptionAlert, DutyTimeWarning, EventPayload,
    FlightUpdate, ReserveCallout,
};

/// Registration that is removed when dropped
#[must_use = "the listener unsubscribes as soon as it is dropped"]
#[derive(Debug)]
pub struct EventListener {
    subscription: Subscription,
}

impl EventListener {
    pub fn kind(&self) -> EventKind {
        self.subscription.kind()
    }

    /// Unsubscribe now instead of at drop
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

/// Listen to raw events of one kind
pub fn on_event<F>(manager: &ConnectionManager, kind: EventKind, callback: F) -> EventListener
where
    F: Fn(&UpdateEvent) + Send + Sync + 'static,
{
    EventListener {
        subscription: manager.subscribe(kind, callback),
    }
}

/// Listen to events whose payload decodes as `P`
pub fn listen<P, F>(manager: &ConnectionManager, callback: F) -> EventListener
where
    P: EventPayload,
    F: Fn(P) + Send + Sync + 'static,
{
    on_event(manager, P::KIND, move |event: &UpdateEvent| {
        match serde_json::from_value::<P>(event.data.clone()) {
            Ok(payload) => callback(payload),
            Err(e) => {
                tracing::warn!(
                    kind = %P::KIND,
                    error = %e,
                    "Dropping event with undecodable payload"
                );
            }
        }
    })
}

pub fn on_flight_update<F>(manager: &ConnectionManager, callback: F) -> EventListener
where
    F: Fn(FlightUpdate) + Send + Sync + 'static,
{
    listen(manager, callback)
}

pub fn on_crew_status_update<F>(manager: &ConnectionManager, callback: F) -> EventListener
where
    F: Fn(CrewStatusUpdate) + Send + Sync + 'static,
{
    listen(manager, callback)
}

pub fn on_disruption_alert<F>(manager: &ConnectionManager, callback: F) -> EventListener
where
    F: Fn(DisruptionAlert) + Send + Sync + 'static,
{
    listen(manager, callback)
}

pub fn on_duty_time_warning<F>(manager: &ConnectionManager, callback: F) -> EventListener
where
    F: Fn(DutyTimeWarning) + Send + Sync + 'static,
{
    listen(manager, callback)
}

pub fn on_reserve_callout<F>(manager: &ConnectionManager, callback: F) -> EventListener
where
    F: Fn(ReserveCallout) + Send + Sync + 'static,
{
    listen(manager, callback)
}

pub fn on_connection_status<F>(manager: &ConnectionManager, callback: F) -> EventListener
where
    F: Fn(ConnectionStatus) + Send + Sync + 'static,
{
    listen(manager, callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::WebSocketConfig;
    use crate::websocket::MemoryTransport;

    fn test_manager() -> ConnectionManager {
        ConnectionManager::new(
            "mem://listeners",
            Arc::new(MemoryTransport::new()),
            &WebSocketConfig::default(),
        )
    }

    #[test]
    fn test_listener_unsubscribes_on_drop() {
        let manager = test_manager();

        let listener = on_flight_update(&manager, |_| {});
        assert_eq!(listener.kind(), EventKind::FlightUpdate);
        assert_eq!(manager.subscriber_count(EventKind::FlightUpdate), 1);

        drop(listener);
        assert_eq!(manager.subscriber_count(EventKind::FlightUpdate), 0);
    }

    #[test]
    fn test_each_helper_targets_one_kind() {
        let manager = test_manager();

        let listeners = vec![
            on_flight_update(&manager, |_| {}),
            on_crew_status_update(&manager, |_| {}),
            on_disruption_alert(&manager, |_| {}),
            on_duty_time_warning(&manager, |_| {}),
            on_reserve_callout(&manager, |_| {}),
        ];

        for kind in EventKind::ALL {
            let expected = usize::from(kind != EventKind::ConnectionStatus);
            assert_eq!(manager.subscriber_count(kind), expected, "kind {}", kind);
        }

        for listener in listeners {
            listener.release();
        }
        assert_eq!(manager.stats().total_subscribers, 0);
    }
}
