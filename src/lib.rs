//! Real-time update channel for the crew operations dashboard.
//!
//! A resilient push client ([`connection_manager::ConnectionManager`]) with
//! heartbeats, bounded exponential reconnect and typed pub/sub, plus an
//! [`coordinator::UpdateCoordinator`] that keeps consumers fresh by polling
//! on a fixed interval regardless of push availability.

// Shared components
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Push channel
pub mod connection_manager;
pub mod events;
pub mod websocket;

// Polling
pub mod coordinator;
pub mod tasks;
