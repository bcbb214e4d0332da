use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::config::{Settings, WebSocketConfig};
use crate::error::{RealtimeError, Result};
use crate::metrics::{ConnectionMetrics, DispatchMetrics, HeartbeatMetrics};
use crate::websocket::{Connection, EventKind, InboundFrame, OutboundFrame, Transport, UpdateEvent};

use super::backoff::{BackoffConfig, ExponentialBackoff};
use super::registry::{EventCallback, SubscriberRegistry, Subscription};
use super::stats::ConnectionStats;
use super::types::{ConnectionState, SessionState, StatusEmit, StatusQueue};

/// Why a transport session ended
enum SessionEnd {
    /// `disconnect()` or a newer `connect()` took over
    Shutdown,
    /// Transport closed or failed
    Lost(String),
}

/// Owns the push connection for one process.
///
/// Cheap to clone; clones share the same session and subscriber registry.
/// Construct once at boot and hand clones to consumers. `connect()` spawns
/// the connection driver and must be called from within a tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    transport: Arc<dyn Transport>,
    backoff: BackoffConfig,
    heartbeat_interval: Duration,
    registry: Arc<SubscriberRegistry>,
    session: Mutex<SessionState>,
    /// Serializes `connection-status` delivery across drivers
    status: Mutex<StatusQueue>,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>, config: &WebSocketConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                transport,
                backoff: BackoffConfig::from(config),
                heartbeat_interval: config.heartbeat_interval(),
                registry: Arc::new(SubscriberRegistry::new()),
                session: Mutex::new(SessionState::new()),
                status: Mutex::new(StatusQueue::default()),
                frames_received: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Build a manager for the endpoint the settings resolve to
    pub fn from_settings(settings: &Settings, transport: Arc<dyn Transport>) -> Result<Self> {
        let url = settings.endpoint()?;
        Ok(Self::new(url, transport, &settings.websocket))
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Start a session. No-op while `Connecting` or `Open`; from any other
    /// state (including a pending retry or `Failed`) the attempt counter is
    /// reset and a fresh attempt starts immediately.
    pub fn connect(&self) {
        let (generation, shutdown_rx) = {
            let mut session = self.inner.session();
            if session.state.is_active() {
                tracing::debug!(state = %session.state, "connect() ignored, session already active");
                return;
            }

            if let Some(previous) = session.reset() {
                let _ = previous.send(());
            }

            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            session.shutdown = Some(shutdown_tx);
            session.state = ConnectionState::Connecting;
            (session.generation, shutdown_rx)
        };

        ConnectionMetrics::set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.inner.url, "Connecting to push endpoint");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drive(generation, shutdown_rx).await;
        });
    }

    /// Tear down the session from any state. Cancels the heartbeat and any
    /// scheduled reconnect, closes the transport and returns to `Idle`.
    pub fn disconnect(&self) {
        let (was_open, previous, shutdown, generation) = {
            let mut session = self.inner.session();
            let previous = session.state;
            let was_open = previous == ConnectionState::Open;
            let shutdown = session.reset();
            (was_open, previous, shutdown, session.generation)
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        ConnectionMetrics::set_state(ConnectionState::Idle);

        if previous != ConnectionState::Idle {
            tracing::info!(previous_state = %previous, "Disconnected from push endpoint");
        }

        if was_open {
            self.inner.emit_status(generation, false);
        }
    }

    /// Register a callback for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.subscribe_arc(kind, Arc::new(callback))
    }

    pub fn subscribe_arc(&self, kind: EventKind, callback: EventCallback) -> Subscription {
        let id = self.inner.registry.insert(kind, callback);
        Subscription::new(self.inner.registry.clone(), kind, id)
    }

    /// Transmit a frame on the open session. While not connected the frame
    /// is dropped and `NotConnected` returned; nothing is queued.
    pub fn send(&self, kind: &str, data: Value) -> Result<()> {
        let outbound = {
            let session = self.inner.session();
            match session.state {
                ConnectionState::Open => session.outbound.clone(),
                _ => None,
            }
        };

        let Some(outbound) = outbound else {
            tracing::warn!(frame_type = %kind, "Dropping outbound frame, not connected");
            return Err(RealtimeError::NotConnected(kind.to_string()));
        };

        let text = OutboundFrame::new(kind, data).to_json()?;
        outbound.send(text).map_err(|_| {
            tracing::warn!(frame_type = %kind, "Dropping outbound frame, session closing");
            RealtimeError::NotConnected(kind.to_string())
        })
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.session().state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.session().reconnect_attempts
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner.registry.subscriber_count(kind)
    }

    pub fn stats(&self) -> ConnectionStats {
        let (state, session_id, reconnect_attempts) = {
            let session = self.inner.session();
            (session.state, session.session_id, session.reconnect_attempts)
        };

        ConnectionStats {
            state,
            session_id,
            reconnect_attempts,
            frames_received: self.inner.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.inner.frames_dropped.load(Ordering::Relaxed),
            total_subscribers: self.inner.registry.total_subscribers(),
            subscribers: EventKind::ALL
                .into_iter()
                .map(|kind| (kind.to_string(), self.inner.registry.subscriber_count(kind)))
                .collect(),
        }
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connection driver: open, run the session, back off, repeat. Exits on
    /// shutdown, when superseded, or when the retry budget is spent.
    async fn drive(self: Arc<Self>, generation: u64, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = ExponentialBackoff::with_config(self.backoff.clone());

        loop {
            let opened = tokio::select! {
                biased;
                _ = shutdown.recv() => return,
                opened = self.transport.open(&self.url) => opened,
            };

            match opened {
                Ok(connection) => {
                    let session_id = Uuid::new_v4();
                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

                    if !self.mark_open(generation, session_id, outbound_tx) {
                        let Connection { mut sink, .. } = connection;
                        let _ = sink.close().await;
                        return;
                    }
                    backoff.reset();
                    tracing::info!(session_id = %session_id, url = %self.url, "Push connection open");
                    self.emit_status(generation, true);

                    let end = self
                        .run_session(generation, connection, outbound_rx, &mut shutdown)
                        .await;

                    match end {
                        SessionEnd::Shutdown => {
                            tracing::debug!(session_id = %session_id, "Session loop stopped");
                            return;
                        }
                        SessionEnd::Lost(reason) => {
                            tracing::warn!(
                                session_id = %session_id,
                                reason = %reason,
                                "Push connection lost"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, url = %self.url, "Push connection attempt failed");
                }
            }

            if !self.mark_closed(generation) {
                return;
            }
            self.emit_status(generation, false);

            let Some(delay) = self.schedule_retry(generation, &mut backoff) else {
                return;
            };

            tokio::select! {
                biased;
                _ = shutdown.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if !self.mark_connecting(generation) {
                return;
            }
        }
    }

    /// Pump one open transport until it closes or the driver is stopped
    async fn run_session(
        &self,
        generation: u64,
        connection: Connection,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let Connection { mut sink, mut stream } = connection;
        let mut heartbeat = heartbeat_timer(self.heartbeat_interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "Error closing transport");
                    }
                    return SessionEnd::Shutdown;
                }
                frame = stream.next() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("closed by peer".to_string()),
                },
                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = sink.send(text).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                _ = next_tick(&mut heartbeat) => {
                    // A tick racing a close must not send
                    if !self.is_open(generation) {
                        continue;
                    }
                    let ping = match OutboundFrame::ping().to_json() {
                        Ok(ping) => ping,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to encode heartbeat");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(ping).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                    HeartbeatMetrics::record_sent();
                    tracing::trace!("Heartbeat sent");
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_frame_received();

        match InboundFrame::parse(text) {
            Ok(InboundFrame::Event(event)) => {
                let result = self.registry.dispatch(&event);
                tracing::trace!(
                    kind = %event.kind,
                    timestamp = %event.timestamp,
                    delivered = result.delivered,
                    failed = result.failed,
                    "Dispatched push event"
                );
            }
            Ok(InboundFrame::Pong) => {
                tracing::trace!("Heartbeat answered");
            }
            Ok(InboundFrame::Unknown(kind)) => {
                self.record_dropped();
                tracing::warn!(frame_type = %kind, "Ignoring frame with unknown event type");
            }
            Err(e) => {
                self.record_dropped();
                tracing::warn!(error = %e, "Dropping malformed frame");
            }
        }
    }

    fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_frame_dropped();
    }

    /// Deliver a status change for `generation`. Emissions are delivered one
    /// at a time in the order they were queued; whoever finds the queue idle
    /// drains it, so a status callback may itself trigger another emission.
    /// An emission whose generation was superseded before delivery is dropped.
    fn emit_status(&self, generation: u64, connected: bool) {
        {
            let mut status = self.status_queue();
            status.pending.push_back(StatusEmit {
                generation,
                connected,
            });
            if status.draining {
                return;
            }
            status.draining = true;
        }

        loop {
            let next = {
                let mut status = self.status_queue();
                match status.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        status.draining = false;
                        return;
                    }
                }
            };

            if self.session().generation != next.generation {
                tracing::debug!(
                    generation = next.generation,
                    connected = next.connected,
                    "Dropping superseded connection status"
                );
                continue;
            }

            ConnectionMetrics::set_connected(next.connected);
            self.registry
                .dispatch(&UpdateEvent::connection_status(next.connected));
        }
    }

    fn status_queue(&self) -> MutexGuard<'_, StatusQueue> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_open(&self, generation: u64) -> bool {
        let session = self.session();
        session.generation == generation && session.state == ConnectionState::Open
    }

    fn mark_open(&self, generation: u64, session_id: Uuid, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        session.state = ConnectionState::Open;
        session.reconnect_attempts = 0;
        session.session_id = Some(session_id);
        session.outbound = Some(outbound);
        ConnectionMetrics::set_state(ConnectionState::Open);
        true
    }

    fn mark_closed(&self, generation: u64) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        session.state = ConnectionState::ClosedPendingRetry;
        session.session_id = None;
        session.outbound = None;
        ConnectionMetrics::set_state(ConnectionState::ClosedPendingRetry);
        true
    }

    fn mark_connecting(&self, generation: u64) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        session.state = ConnectionState::Connecting;
        ConnectionMetrics::set_state(ConnectionState::Connecting);
        true
    }

    /// Count the next retry and return its delay, or move to `Failed` when
    /// the budget is spent
    fn schedule_retry(&self, generation: u64, backoff: &mut ExponentialBackoff) -> Option<Duration> {
        let mut session = self.session();
        if session.generation != generation {
            return None;
        }

        match backoff.next_delay() {
            Some(delay) => {
                session.reconnect_attempts = backoff.attempt();
                ConnectionMetrics::record_reconnect_attempt();
                tracing::info!(
                    attempt = backoff.attempt(),
                    max_attempts = backoff.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                Some(delay)
            }
            None => {
                session.state = ConnectionState::Failed;
                ConnectionMetrics::set_state(ConnectionState::Failed);
                tracing::error!(
                    attempts = backoff.attempt(),
                    "Giving up on push connection after max reconnect attempts"
                );
                None
            }
        }
    }
}

fn heartbeat_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
