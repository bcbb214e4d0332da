use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

/// What a consumer needs to render "data is fresh as of T"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Freshness {
    pub is_connected: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub update_count: u64,
    /// Whole seconds since the last completed refresh, recomputed every second
    pub time_since_update_secs: Option<u64>,
    #[serde(skip)]
    pub(crate) refreshed_at: Option<Instant>,
}

impl Freshness {
    fn new(is_connected: bool) -> Self {
        Self {
            is_connected,
            last_update: None,
            update_count: 0,
            time_since_update_secs: None,
            refreshed_at: None,
        }
    }
}

/// Shared freshness record. The refresh path, the connection-status
/// subscription and the age ticker each write their own fields; nothing
/// else coordinates them. After `close()` every write is ignored.
#[derive(Clone)]
pub struct FreshnessState {
    tx: Arc<watch::Sender<Freshness>>,
    closed: Arc<AtomicBool>,
}

impl FreshnessState {
    pub fn new(is_connected: bool) -> Self {
        let (tx, _) = watch::channel(Freshness::new(is_connected));
        Self {
            tx: Arc::new(tx),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Freeze the record. Returns once no write is in flight.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Wait out a writer holding the value lock
        self.tx.send_if_modified(|_| false);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Freshness {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Freshness> {
        self.tx.subscribe()
    }

    /// A refresh finished, successfully or not
    pub fn record_refresh(&self) {
        let now = Instant::now();
        self.tx.send_if_modified(|f| {
            if self.is_closed() {
                return false;
            }
            f.last_update = Some(Utc::now());
            f.refreshed_at = Some(now);
            f.update_count += 1;
            f.time_since_update_secs = Some(0);
            true
        });
    }

    pub fn set_connected(&self, connected: bool) {
        self.tx.send_if_modified(|f| {
            if self.is_closed() || f.is_connected == connected {
                return false;
            }
            f.is_connected = connected;
            true
        });
    }

    /// Recompute the display age; only notifies watchers when it changed
    pub fn recompute_age(&self) {
        self.tx.send_if_modified(|f| {
            if self.is_closed() {
                return false;
            }
            let Some(refreshed_at) = f.refreshed_at else {
                return false;
            };
            let secs = refreshed_at.elapsed().as_secs();
            if f.time_since_update_secs == Some(secs) {
                return false;
            }
            f.time_since_update_secs = Some(secs);
            true
        });
    }
}
