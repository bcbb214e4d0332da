//! Push transport: wire frames and the connection seam.

pub mod memory;
mod message;
mod transport;

pub use memory::{MemoryPeer, MemoryTransport};
pub use message::{EventKind, InboundFrame, OutboundFrame, UpdateEvent, PING_TYPE, PONG_TYPE};
pub use transport::{Connection, FrameSink, FrameStream, Transport, WsTransport};
