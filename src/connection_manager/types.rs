//! Connection session state

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Lifecycle of the push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    ClosedPendingRetry,
    Failed,
}

impl ConnectionState {
    /// States in which `connect()` is a no-op
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// Gauge encoding (0=idle, 1=connecting, 2=open, 3=retry pending, 4=failed)
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::ClosedPendingRetry => 3,
            ConnectionState::Failed => 4,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::ClosedPendingRetry => "closed_pending_retry",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Mutable session fields, guarded by the manager's session lock
pub(crate) struct SessionState {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    /// Bumped by every `connect()` and `disconnect()`; a driver whose
    /// generation no longer matches must not touch the session
    pub generation: u64,
    /// Id of the transport session currently open, for logs
    pub session_id: Option<Uuid>,
    /// Outbound frames for the open transport
    pub outbound: Option<mpsc::UnboundedSender<String>>,
    /// Stops the current driver (session loop, heartbeat, retry sleep)
    pub shutdown: Option<broadcast::Sender<()>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            reconnect_attempts: 0,
            generation: 0,
            session_id: None,
            outbound: None,
            shutdown: None,
        }
    }

    /// Drop everything tied to a driver and return to `Idle`
    pub fn reset(&mut self) -> Option<broadcast::Sender<()>> {
        self.generation += 1;
        self.state = ConnectionState::Idle;
        self.reconnect_attempts = 0;
        self.session_id = None;
        self.outbound = None;
        self.shutdown.take()
    }
}

/// One pending `connection-status` emission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StatusEmit {
    pub generation: u64,
    pub connected: bool,
}

/// Status emissions waiting for delivery, plus whether a caller is
/// currently delivering them
#[derive(Debug, Default)]
pub(crate) struct StatusQueue {
    pub pending: VecDeque<StatusEmit>,
    pub draining: bool,
}
