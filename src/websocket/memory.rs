//! In-process transport with a scripted peer.
//!
//! Each `open()` waits for the next scripted outcome: [`MemoryTransport::accept`]
//! completes it with a live [`MemoryPeer`], [`MemoryTransport::refuse`] fails
//! it. Until an outcome is queued the open stays pending, which lets callers
//! observe the `Connecting` state.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc as frames;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::{RealtimeError, Result};

use super::transport::{Connection, Transport};

enum OpenOutcome {
    Accept(oneshot::Sender<MemoryPeer>),
    Refuse(String),
}

/// Server side of an in-memory connection
pub struct MemoryPeer {
    inbound: frames::UnboundedSender<Result<String>>,
    outbound: frames::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Push a raw text frame to the client
    pub fn push_raw(&self, text: impl Into<String>) -> bool {
        self.inbound.unbounded_send(Ok(text.into())).is_ok()
    }

    /// Push an event frame stamped with the current time
    pub fn push_event(&self, kind: &str, data: serde_json::Value) -> bool {
        let frame = serde_json::json!({
            "type": kind,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "data": data,
        });
        self.push_raw(frame.to_string())
    }

    /// Fail the transport with an error
    pub fn fail(&self, reason: &str) -> bool {
        self.inbound
            .unbounded_send(Err(RealtimeError::Transport(reason.to_string())))
            .is_ok()
    }

    /// Close the transport from the server side
    pub fn close(self) {
        self.inbound.close_channel();
    }

    /// Frames the client has sent so far, without waiting
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(Some(frame)) = self.outbound.try_next() {
            sent.push(frame);
        }
        sent
    }

    /// Wait for the next frame from the client; `None` once the client side
    /// is closed
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outbound.next().await
    }

    /// Whether the client has released its end of the connection. Pending
    /// frames are discarded.
    pub fn is_client_closed(&mut self) -> bool {
        loop {
            match self.outbound.try_next() {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    /// Decode a client frame's type tag
    pub fn frame_type(frame: &str) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(frame)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned))
    }
}

/// Scripted in-memory transport
#[derive(Clone)]
pub struct MemoryTransport {
    script_tx: mpsc::UnboundedSender<OpenOutcome>,
    script_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<OpenOutcome>>>,
    opens: Arc<Mutex<Vec<Instant>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (script_tx, script_rx) = mpsc::unbounded_channel();
        Self {
            script_tx,
            script_rx: Arc::new(tokio::sync::Mutex::new(script_rx)),
            opens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Let the next open succeed; resolves to the server side once the
    /// client has picked it up
    pub fn accept(&self) -> oneshot::Receiver<MemoryPeer> {
        let (tx, rx) = oneshot::channel();
        let _ = self.script_tx.send(OpenOutcome::Accept(tx));
        rx
    }

    /// Let the next open fail
    pub fn refuse(&self, reason: &str) {
        let _ = self.script_tx.send(OpenOutcome::Refuse(reason.to_string()));
    }

    /// Number of open attempts started so far
    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Instants at which each open attempt started
    pub fn open_instants(&self) -> Vec<Instant> {
        self.opens.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<Connection> {
        self.opens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Instant::now());

        let outcome = self.script_rx.lock().await.recv().await;

        match outcome {
            Some(OpenOutcome::Accept(peer_tx)) => {
                let (inbound_tx, inbound_rx) = frames::unbounded::<Result<String>>();
                let (outbound_tx, outbound_rx) = frames::unbounded::<String>();

                let peer = MemoryPeer {
                    inbound: inbound_tx,
                    outbound: outbound_rx,
                };
                if peer_tx.send(peer).is_err() {
                    return Err(RealtimeError::Transport(format!(
                        "peer for {} went away before open",
                        url
                    )));
                }

                let sink = outbound_tx.sink_map_err(RealtimeError::transport);
                Ok(Connection::new(Box::pin(sink), Box::pin(inbound_rx)))
            }
            Some(OpenOutcome::Refuse(reason)) => Err(RealtimeError::Transport(reason)),
            None => Err(RealtimeError::Transport("transport script closed".to_string())),
        }
    }
}
