use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::connection_manager::panic_message;
use crate::coordinator::{FreshnessState, RefreshSource};
use crate::metrics::RefreshMetrics;

/// Run one refresh and record its completion. Errors and panics are logged
/// and still count as a completed refresh.
pub(crate) async fn run_refresh(source: &dyn RefreshSource, freshness: &FreshnessState) {
    match AssertUnwindSafe(source.refresh()).catch_unwind().await {
        Ok(Ok(())) => {
            RefreshMetrics::record_success();
            tracing::debug!("Refresh completed");
        }
        Ok(Err(e)) => {
            RefreshMetrics::record_failure();
            tracing::warn!(error = %e, "Refresh failed, will retry on next tick");
        }
        Err(payload) => {
            RefreshMetrics::record_failure();
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "Refresh panicked, will retry on next tick"
            );
        }
    }
    freshness.record_refresh();
}

/// Background task polling the refresh source on a fixed interval
pub struct RefreshTask {
    interval: Duration,
    source: Arc<dyn RefreshSource>,
    freshness: FreshnessState,
    shutdown: broadcast::Receiver<()>,
}

impl RefreshTask {
    pub fn new(
        interval: Duration,
        source: Arc<dyn RefreshSource>,
        freshness: FreshnessState,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            interval,
            source,
            freshness,
            shutdown,
        }
    }

    /// Refresh immediately, then once per interval until shutdown
    pub async fn run(mut self) {
        // First tick completes immediately
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            refresh_interval_ms = self.interval.as_millis() as u64,
            "Refresh task started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => break,
                _ = timer.tick() => {}
            }

            tokio::select! {
                biased;
                _ = self.shutdown.recv() => break,
                _ = run_refresh(self.source.as_ref(), &self.freshness) => {}
            }
        }

        tracing::info!("Refresh task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::refresh_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_polls_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_source = calls.clone();
        let source = refresh_fn(move || {
            let calls = calls_in_source.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let freshness = FreshnessState::new(false);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = RefreshTask::new(
            Duration::from_millis(1000),
            source,
            freshness.clone(),
            shutdown_rx,
        );
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(freshness.snapshot().update_count, 3);

        shutdown_tx.send(()).unwrap();
        handle.await.expect("Task should not panic");

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_still_counts() {
        let source = refresh_fn(|| async { Err(anyhow::anyhow!("crew roster service unavailable")) });
        let freshness = FreshnessState::new(false);

        run_refresh(source.as_ref(), &freshness).await;
        run_refresh(source.as_ref(), &freshness).await;

        let snapshot = freshness.snapshot();
        assert_eq!(snapshot.update_count, 2);
        assert!(snapshot.last_update.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_refresh_counts_as_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = refresh_fn(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("roster decoder blew up");
                }
                Ok(())
            }
        });
        let freshness = FreshnessState::new(false);

        run_refresh(source.as_ref(), &freshness).await;
        assert_eq!(freshness.snapshot().update_count, 1);

        run_refresh(source.as_ref(), &freshness).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(freshness.snapshot().update_count, 2);
    }
}
