use std::sync::Arc;

use anyhow::Result;
use tokio::signal;

use crew_ops_realtime::config::Settings;
use crew_ops_realtime::connection_manager::ConnectionManager;
use crew_ops_realtime::coordinator::{refresh_fn, UpdateCoordinator};
use crew_ops_realtime::events::{
    on_connection_status, on_crew_status_update, on_disruption_alert, on_duty_time_warning,
    on_flight_update, on_reserve_callout, EventListener,
};
use crew_ops_realtime::metrics::encode_metrics;
use crew_ops_realtime::telemetry::init_tracing;
use crew_ops_realtime::websocket::WsTransport;

// One push channel and one coordinator need no worker pool
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    init_tracing(&settings.logging)?;
    tracing::info!(run_mode = %settings.run_mode, "Configuration loaded");

    let manager = ConnectionManager::from_settings(&settings, Arc::new(WsTransport::new()))?;
    tracing::info!(url = %manager.url(), "Connection manager initialized");

    let listeners = register_listeners(&manager);

    let stats_source = manager.clone();
    let refresher = refresh_fn(move || {
        let manager = stats_source.clone();
        async move {
            let stats = manager.stats();
            tracing::info!(
                state = %stats.state,
                reconnect_attempts = stats.reconnect_attempts,
                frames_received = stats.frames_received,
                frames_dropped = stats.frames_dropped,
                subscribers = stats.total_subscribers,
                "Periodic refresh"
            );
            Ok(())
        }
    });
    let coordinator = UpdateCoordinator::activate(&manager, &settings.coordinator, refresher);

    manager.connect();

    shutdown_signal().await;

    tracing::info!("Shutting down...");

    coordinator.deactivate();
    drop(listeners);
    manager.disconnect();

    match encode_metrics() {
        Ok(metrics) => tracing::debug!("Final metrics:\n{}", metrics),
        Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
    }

    tracing::info!("Shutdown complete");

    Ok(())
}

fn register_listeners(manager: &ConnectionManager) -> Vec<EventListener> {
    vec![
        on_flight_update(manager, |update| {
            tracing::info!(
                flight_id = %update.flight_id,
                status = ?update.status,
                delay = ?update.delay,
                gate = ?update.gate,
                "Flight update"
            );
        }),
        on_crew_status_update(manager, |update| {
            tracing::info!(
                crew_id = %update.crew_id,
                status = ?update.status,
                location = ?update.location,
                "Crew status update"
            );
        }),
        on_disruption_alert(manager, |alert| {
            tracing::warn!(
                severity = ?alert.severity,
                alert_type = %alert.alert_type,
                affected_crew = alert.affected_crew,
                "Disruption alert"
            );
        }),
        on_duty_time_warning(manager, |warning| {
            tracing::warn!(
                crew_id = %warning.crew_id,
                duty_hours = warning.duty_hours,
                risk_level = ?warning.risk_level,
                "Duty time warning"
            );
        }),
        on_reserve_callout(manager, |callout| {
            tracing::info!(
                reserve_id = %callout.reserve_id,
                status = ?callout.status,
                flight_id = ?callout.flight_id,
                "Reserve callout"
            );
        }),
        on_connection_status(manager, |status| {
            tracing::info!(connected = status.connected, "Push connection status changed");
        }),
    ]
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
