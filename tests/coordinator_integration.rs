//! Update coordinator integration tests
//!
//! Polling runs on tokio's paused clock; the push channel is an in-memory
//! transport so connection status can be toggled from the test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crew_ops_realtime::config::{CoordinatorConfig, WebSocketConfig};
use crew_ops_realtime::connection_manager::{ConnectionManager, ConnectionState};
use crew_ops_realtime::coordinator::{refresh_fn, RefreshSource, UpdateCoordinator};
use crew_ops_realtime::websocket::{EventKind, MemoryPeer, MemoryTransport};

fn create_manager() -> (ConnectionManager, MemoryTransport) {
    let transport = MemoryTransport::new();
    let manager = ConnectionManager::new(
        "mem://crew-ops",
        Arc::new(transport.clone()),
        &WebSocketConfig::default(),
    );
    (manager, transport)
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn open_session(manager: &ConnectionManager, transport: &MemoryTransport) -> MemoryPeer {
    let peer_rx = transport.accept();
    manager.connect();
    settle().await;
    let peer = peer_rx.await.expect("open should be accepted");
    settle().await;
    assert_eq!(manager.state(), ConnectionState::Open);
    peer
}

/// Refresh source counting its invocations
fn counting_source() -> (Arc<AtomicUsize>, Arc<dyn RefreshSource>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let source = refresh_fn(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    (calls, source)
}

fn config(refresh_interval_ms: u64, enable_websocket_awareness: bool) -> CoordinatorConfig {
    CoordinatorConfig {
        refresh_interval_ms,
        enable_websocket_awareness,
    }
}

#[tokio::test(start_paused = true)]
async fn test_polling_independent_of_push_channel() {
    let (manager, transport) = create_manager();
    let (calls, source) = counting_source();

    let coordinator = UpdateCoordinator::activate(&manager, &config(5_000, false), source);
    settle().await;
    assert_eq!(coordinator.update_count(), 1);
    assert!(coordinator.last_update().is_some());

    // Push connection coming and going does not touch the schedule
    let peer = open_session(&manager, &transport).await;
    peer.close();
    settle().await;
    assert_eq!(coordinator.update_count(), 1);
    assert!(!coordinator.is_connected());

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    settle().await;
    assert_eq!(coordinator.update_count(), 2);

    tokio::time::sleep(Duration::from_millis(10_000)).await;
    settle().await;
    assert_eq!(coordinator.update_count(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_awareness_mirrors_connection_status() {
    let (manager, transport) = create_manager();
    let peer = open_session(&manager, &transport).await;

    let coordinator =
        UpdateCoordinator::activate(&manager, &config(0, true), refresh_fn(|| async { Ok(()) }));
    // Seeded from the current state
    assert!(coordinator.is_connected());

    let mut freshness = coordinator.watch();
    peer.close();
    settle().await;

    assert!(!coordinator.is_connected());
    assert!(freshness.has_changed().unwrap());
    assert!(!freshness.borrow_and_update().is_connected);

    let _peer = open_session_after_retry(&manager, &transport).await;
    assert!(coordinator.is_connected());
    assert_eq!(coordinator.update_count(), 0);
}

async fn open_session_after_retry(
    manager: &ConnectionManager,
    transport: &MemoryTransport,
) -> MemoryPeer {
    let peer_rx = transport.accept();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    settle().await;
    let peer = peer_rx.await.expect("retry should reopen");
    settle().await;
    assert_eq!(manager.state(), ConnectionState::Open);
    peer
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_keeps_polling() {
    let (manager, _transport) = create_manager();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let source = refresh_fn(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("roster service returned 503"))
        }
    });

    let coordinator = UpdateCoordinator::activate(&manager, &config(1_000, false), source);
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    settle().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(coordinator.update_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_refresh_keeps_polling() {
    let (manager, _transport) = create_manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let source = refresh_fn(move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                panic!("duty roster payload truncated");
            }
            Ok(())
        }
    });

    let coordinator = UpdateCoordinator::activate(&manager, &config(1_000, false), source);
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 11);
    assert_eq!(coordinator.update_count(), 11);
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_leaves_schedule_alone() {
    let (manager, _transport) = create_manager();
    let (calls, source) = counting_source();

    let coordinator = UpdateCoordinator::activate(&manager, &config(60_000, false), source);
    settle().await;
    assert_eq!(coordinator.update_count(), 1);

    tokio::time::sleep(Duration::from_millis(10_000)).await;
    coordinator.manual_refresh().await;
    assert_eq!(coordinator.update_count(), 2);
    assert_eq!(coordinator.time_since_update_secs(), Some(0));

    tokio::time::sleep(Duration::from_millis(49_000)).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_time_since_update_ticks() {
    let (manager, _transport) = create_manager();
    let (_calls, source) = counting_source();

    let coordinator = UpdateCoordinator::activate(&manager, &config(30_000, false), source);
    settle().await;
    assert_eq!(coordinator.time_since_update_secs(), Some(0));

    tokio::time::sleep(Duration::from_millis(7_500)).await;
    settle().await;
    assert_eq!(coordinator.time_since_update_secs(), Some(7));
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_stops_polling_and_unsubscribes() {
    let (manager, _transport) = create_manager();
    let (calls, source) = counting_source();

    let coordinator = UpdateCoordinator::activate(&manager, &config(1_000, true), source);
    settle().await;
    assert_eq!(manager.subscriber_count(EventKind::ConnectionStatus), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    coordinator.deactivate();
    assert_eq!(manager.subscriber_count(EventKind::ConnectionStatus), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_tears_down_like_deactivate() {
    let (manager, _transport) = create_manager();
    let (calls, source) = counting_source();

    {
        let _coordinator = UpdateCoordinator::activate(&manager, &config(1_000, true), source);
        settle().await;
    }

    assert_eq!(manager.subscriber_count(EventKind::ConnectionStatus), 0);
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_cancels_refresh_in_flight() {
    let (manager, _transport) = create_manager();
    let completed = Arc::new(AtomicUsize::new(0));
    let counter = completed.clone();
    let source = refresh_fn(move || {
        let counter = counter.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let coordinator = UpdateCoordinator::activate(&manager, &config(1_000, false), source);
    let freshness = coordinator.watch();
    settle().await;

    coordinator.deactivate();
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;

    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert_eq!(freshness.borrow().update_count, 0);
}
