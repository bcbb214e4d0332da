//! Connection statistics

use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::ConnectionState;

/// Point-in-time view of a connection manager
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    /// Id of the open transport session, if any
    pub session_id: Option<Uuid>,
    pub reconnect_attempts: u32,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub total_subscribers: usize,
    /// Subscriber count per event kind (wire name)
    pub subscribers: HashMap<String, usize>,
}
