use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::coordinator::FreshnessState;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Background task recomputing the display age of the last refresh
pub struct FreshnessTicker {
    freshness: FreshnessState,
    shutdown: broadcast::Receiver<()>,
}

impl FreshnessTicker {
    pub fn new(freshness: FreshnessState, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            freshness,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(TICK_INTERVAL);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => break,
                _ = timer.tick() => self.freshness.recompute_age(),
            }
        }

        tracing::debug!("Freshness ticker stopped");
    }
}
