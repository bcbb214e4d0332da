//! Transport seam for the push connection.
//!
//! A [`Transport`] opens one [`Connection`]: a sink of outbound text frames
//! and a stream of inbound text frames. The stream ending (or yielding an
//! error) means the transport closed.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, protocol::Message};

use crate::error::{RealtimeError, Result};

pub type FrameSink = Pin<Box<dyn Sink<String, Error = RealtimeError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open transport session
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection; resolves once the transport acknowledges the open
    async fn open(&self, url: &str) -> Result<Connection>;
}

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Connection> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| match e {
                tungstenite::Error::Http(response) => RealtimeError::Transport(format!(
                    "WebSocket HTTP error: {}",
                    response.status()
                )),
                other => RealtimeError::transport(other),
            })?;

        tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();

        let sink = write
            .with(|text: String| {
                future::ready(Ok::<_, tungstenite::Error>(Message::Text(text.into())))
            })
            .sink_map_err(RealtimeError::transport);

        let stream = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame");
                        None
                    }
                },
                // Control frames are handled by tungstenite; the stream ends after Close
                Ok(_) => None,
                Err(e) => Some(Err(RealtimeError::transport(e))),
            })
        });

        Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
    }
}
