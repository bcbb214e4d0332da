//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::connection_manager::ConnectionState;
use crate::websocket::EventKind;

use super::{
    CONNECTION_STATE, CONNECTION_STATUS, FRAMES_DROPPED_TOTAL, FRAMES_RECEIVED_TOTAL,
    HEARTBEATS_SENT_TOTAL, RECONNECT_ATTEMPTS_TOTAL, REFRESHES_TOTAL, SUBSCRIBER_FAILURES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn set_state(state: ConnectionState) {
        CONNECTION_STATE.set(state.as_gauge());
    }

    pub fn set_connected(connected: bool) {
        CONNECTION_STATUS.set(if connected { 1 } else { 0 });
    }

    pub fn record_reconnect_attempt() {
        RECONNECT_ATTEMPTS_TOTAL.inc();
    }
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_frame_received() {
        FRAMES_RECEIVED_TOTAL.inc();
    }

    pub fn record_frame_dropped() {
        FRAMES_DROPPED_TOTAL.inc();
    }

    pub fn record_subscriber_failure(kind: EventKind) {
        SUBSCRIBER_FAILURES_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_sent() {
        HEARTBEATS_SENT_TOTAL.inc();
    }
}

/// Helper struct for recording refresh outcomes
pub struct RefreshMetrics;

impl RefreshMetrics {
    pub fn record_success() {
        REFRESHES_TOTAL.with_label_values(&["success"]).inc();
    }

    pub fn record_failure() {
        REFRESHES_TOTAL.with_label_values(&["failure"]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_recorded_metrics() {
        DispatchMetrics::record_frame_received();
        DispatchMetrics::record_subscriber_failure(EventKind::DutyTimeWarning);
        RefreshMetrics::record_failure();

        let text = encode_metrics().unwrap();
        assert!(text.contains("crew_ops_realtime_frames_received_total"));
        assert!(text.contains("kind=\"duty-time-warning\""));
        assert!(text.contains("outcome=\"failure\""));
    }
}
