//! Prometheus metrics for the real-time update channel.
//!
//! - Connection metrics (state, connected flag, reconnect attempts)
//! - Dispatch metrics (frames received and dropped, subscriber failures)
//! - Heartbeat metrics
//! - Refresh metrics (polling outcomes)

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, DispatchMetrics, HeartbeatMetrics, RefreshMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "crew_ops_realtime";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Connection state (0=idle, 1=connecting, 2=open, 3=retry pending, 4=failed)
    pub static ref CONNECTION_STATE: IntGauge = register_int_gauge!(
        format!("{}_connection_state", METRIC_PREFIX),
        "Push connection state (0=idle, 1=connecting, 2=open, 3=retry pending, 4=failed)"
    ).unwrap();

    /// Last emitted connection status (1 = connected, 0 = disconnected)
    pub static ref CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_connection_status", METRIC_PREFIX),
        "Push connection status (1=connected, 0=disconnected)"
    ).unwrap();

    /// Total scheduled reconnect attempts
    pub static ref RECONNECT_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnect_attempts_total", METRIC_PREFIX),
        "Total scheduled reconnect attempts"
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Inbound frames received from the transport
    pub static ref FRAMES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_received_total", METRIC_PREFIX),
        "Total inbound frames received"
    ).unwrap();

    /// Inbound frames dropped as malformed or of unknown type
    pub static ref FRAMES_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_dropped_total", METRIC_PREFIX),
        "Total inbound frames dropped before dispatch"
    ).unwrap();

    /// Subscriber callbacks that panicked, by event kind
    pub static ref SUBSCRIBER_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_subscriber_failures_total", METRIC_PREFIX),
        "Total subscriber callback failures",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Heartbeat frames sent
    pub static ref HEARTBEATS_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeats_sent_total", METRIC_PREFIX),
        "Total heartbeat frames sent"
    ).unwrap();

    // ============================================================================
    // Refresh Metrics
    // ============================================================================

    /// Refresh completions by outcome (success/failure)
    pub static ref REFRESHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_refreshes_total", METRIC_PREFIX),
        "Total refresh completions",
        &["outcome"]
    ).unwrap();
}
