use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;

use crate::metrics::DispatchMetrics;
use crate::websocket::{EventKind, UpdateEvent};

/// Subscriber callback invoked with every event of its kind
pub type EventCallback = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

type SubscriberList = SmallVec<[(u64, EventCallback); 4]>;

/// Outcome of dispatching one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchResult {
    pub delivered: usize,
    pub failed: usize,
}

/// event kind -> subscribers, in registration order
pub struct SubscriberRegistry {
    subscribers: DashMap<EventKind, SubscriberList>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create a registry with an empty subscriber set for every kind
    pub fn new() -> Self {
        let subscribers = DashMap::new();
        for kind in EventKind::ALL {
            subscribers.insert(kind, SubscriberList::new());
        }
        Self {
            subscribers,
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback and return the id of this registration
    pub fn insert(&self, kind: EventKind, callback: EventCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(kind)
            .or_default()
            .push((id, callback));

        tracing::debug!(kind = %kind, subscriber_id = id, "Subscriber registered");
        id
    }

    /// Remove exactly one registration; returns whether it was present
    pub fn remove(&self, kind: EventKind, id: u64) -> bool {
        let removed = self
            .subscribers
            .get_mut(&kind)
            .map(|mut subs| {
                let before = subs.len();
                subs.retain(|(sub_id, _)| *sub_id != id);
                subs.len() != before
            })
            .unwrap_or(false);

        if removed {
            tracing::debug!(kind = %kind, subscriber_id = id, "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map(|s| s.len()).unwrap_or(0)
    }

    pub fn total_subscribers(&self) -> usize {
        self.subscribers.iter().map(|entry| entry.value().len()).sum()
    }

    /// Invoke every subscriber of the event's kind. Callbacks run on a
    /// snapshot taken outside the map lock, so they may subscribe or
    /// unsubscribe freely. A panicking callback is logged and skipped.
    pub fn dispatch(&self, event: &UpdateEvent) -> DispatchResult {
        let snapshot: SubscriberList = match self.subscribers.get(&event.kind) {
            Some(subs) => subs.clone(),
            None => SubscriberList::new(),
        };

        let mut result = DispatchResult::default();
        for (id, callback) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => result.delivered += 1,
                Err(payload) => {
                    result.failed += 1;
                    DispatchMetrics::record_subscriber_failure(event.kind);
                    tracing::error!(
                        kind = %event.kind,
                        subscriber_id = id,
                        panic = %panic_message(payload.as_ref()),
                        "Subscriber callback failed"
                    );
                }
            }
        }
        result
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Disposer for one registration. `unsubscribe` removes exactly that
/// registration; later calls are no-ops. Dropping the handle leaves the
/// registration in place.
#[must_use = "dropping a Subscription keeps the callback registered; call unsubscribe() to remove it"]
pub struct Subscription {
    registry: Arc<SubscriberRegistry>,
    kind: EventKind,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(registry: Arc<SubscriberRegistry>, kind: EventKind, id: u64) -> Self {
        Self {
            registry,
            kind,
            id,
            active: AtomicBool::new(true),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.registry.remove(self.kind, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
