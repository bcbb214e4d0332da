//! Update coordinator.
//!
//! Keeps a consumer's view of remote data current by polling a refresh
//! source on a fixed interval, independent of the push channel. Push events
//! only update the connection indicator; they never stop or reschedule
//! polling.

mod freshness;

pub use freshness::{Freshness, FreshnessState};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::CoordinatorConfig;
use crate::connection_manager::{ConnectionManager, Subscription};
use crate::tasks::{run_refresh, FreshnessTicker, RefreshTask};
use crate::websocket::EventKind;

/// Source of fresh data. Errors are logged by the coordinator and never
/// stop polling.
#[async_trait]
pub trait RefreshSource: Send + Sync {
    async fn refresh(&self) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`RefreshSource`]
pub struct RefreshFn<F>(F);

#[async_trait]
impl<F, Fut> RefreshSource for RefreshFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn refresh(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

pub fn refresh_fn<F, Fut>(f: F) -> Arc<dyn RefreshSource>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(RefreshFn(f))
}

/// Everything released when the coordinator goes away
struct Teardown {
    shutdown: Option<broadcast::Sender<()>>,
    status: Option<Subscription>,
    tasks: Vec<JoinHandle<()>>,
    freshness: FreshnessState,
}

impl Teardown {
    /// Returns false if already torn down. Once this returns, no task or
    /// status callback writes the freshness record again.
    fn run(&mut self) -> bool {
        let Some(shutdown) = self.shutdown.take() else {
            return false;
        };
        self.freshness.close();
        let _ = shutdown.send(());
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(status) = self.status.take() {
            status.unsubscribe();
        }
        true
    }
}

/// Active polling schedule plus freshness state for one consumer
pub struct UpdateCoordinator {
    freshness: FreshnessState,
    source: Arc<dyn RefreshSource>,
    teardown: Teardown,
}

impl UpdateCoordinator {
    /// Start polling and, if enabled, mirror the push channel's connection
    /// status. Must be called inside a tokio runtime.
    pub fn activate(
        manager: &ConnectionManager,
        config: &CoordinatorConfig,
        source: Arc<dyn RefreshSource>,
    ) -> Self {
        let freshness = FreshnessState::new(false);

        let status = if config.enable_websocket_awareness {
            let mirror = freshness.clone();
            let subscription = manager.subscribe(EventKind::ConnectionStatus, move |event| {
                if let Some(connected) = event.data.get("connected").and_then(Value::as_bool) {
                    mirror.set_connected(connected);
                }
            });
            // Seed after subscribing so no transition is missed
            freshness.set_connected(manager.is_connected());
            Some(subscription)
        } else {
            None
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = Vec::with_capacity(2);

        if config.refresh_interval_ms > 0 {
            let task = RefreshTask::new(
                Duration::from_millis(config.refresh_interval_ms),
                source.clone(),
                freshness.clone(),
                shutdown_tx.subscribe(),
            );
            tasks.push(tokio::spawn(task.run()));
        }

        tasks.push(tokio::spawn(
            FreshnessTicker::new(freshness.clone(), shutdown_tx.subscribe()).run(),
        ));

        tracing::info!(
            refresh_interval_ms = config.refresh_interval_ms,
            websocket_awareness = config.enable_websocket_awareness,
            "Update coordinator activated"
        );

        Self {
            freshness: freshness.clone(),
            source,
            teardown: Teardown {
                shutdown: Some(shutdown_tx),
                status,
                tasks,
                freshness,
            },
        }
    }

    /// Run one refresh now. The polling schedule is left untouched.
    pub async fn manual_refresh(&self) {
        run_refresh(self.source.as_ref(), &self.freshness).await;
    }

    pub fn snapshot(&self) -> Freshness {
        self.freshness.snapshot()
    }

    /// Change notifications for the freshness record
    pub fn watch(&self) -> watch::Receiver<Freshness> {
        self.freshness.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.freshness.snapshot().is_connected
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.freshness.snapshot().last_update
    }

    pub fn update_count(&self) -> u64 {
        self.freshness.snapshot().update_count
    }

    pub fn time_since_update_secs(&self) -> Option<u64> {
        self.freshness.snapshot().time_since_update_secs
    }

    /// Stop polling and the ticker and drop the status subscription
    pub fn deactivate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.teardown.run() {
            tracing::info!("Update coordinator deactivated");
        }
    }
}

impl Drop for UpdateCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebSocketConfig;
    use crate::websocket::MemoryTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_manager() -> ConnectionManager {
        ConnectionManager::new(
            "mem://coordinator",
            Arc::new(MemoryTransport::new()),
            &WebSocketConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disables_polling() {
        let manager = test_manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = refresh_fn(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let config = CoordinatorConfig {
            refresh_interval_ms: 0,
            enable_websocket_awareness: false,
        };

        let coordinator = UpdateCoordinator::activate(&manager, &config, source);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        coordinator.manual_refresh().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.update_count(), 1);
    }

    #[tokio::test]
    async fn test_awareness_subscription_released_once() {
        let manager = test_manager();
        let config = CoordinatorConfig {
            refresh_interval_ms: 0,
            enable_websocket_awareness: true,
        };

        let coordinator =
            UpdateCoordinator::activate(&manager, &config, refresh_fn(|| async { Ok(()) }));
        assert_eq!(manager.subscriber_count(EventKind::ConnectionStatus), 1);
        assert!(!coordinator.is_connected());

        coordinator.deactivate();
        assert_eq!(manager.subscriber_count(EventKind::ConnectionStatus), 0);
    }

    #[tokio::test]
    async fn test_teardown_runs_once_and_aborts_tasks() {
        let (tx, mut rx) = broadcast::channel(1);
        let freshness = FreshnessState::new(false);
        let task = tokio::spawn(std::future::pending::<()>());
        let abort = task.abort_handle();
        let mut teardown = Teardown {
            shutdown: Some(tx),
            status: None,
            tasks: vec![task],
            freshness: freshness.clone(),
        };

        assert!(teardown.run());
        assert!(!teardown.run());
        assert!(rx.try_recv().is_ok());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());

        // Writes after teardown are ignored
        freshness.record_refresh();
        freshness.set_connected(true);
        let snapshot = freshness.snapshot();
        assert_eq!(snapshot.update_count, 0);
        assert!(!snapshot.is_connected);
    }
}
