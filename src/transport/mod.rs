//! Stream transport contract.
//!
//! A transport owns the byte-level connection: it connects, serializes
//! outgoing documents, parses incoming ones and reports lifecycle events to
//! exactly one [`TransportListener`]. The session implements the listener
//! side.
//!
//! # Threading
//!
//! Implementations deliver callbacks from one I/O thread and never run two
//! callbacks concurrently. `send`, `close`, `start_tls` and `restart` may be
//! called from any thread, including from inside a callback, so they must
//! not wait for the I/O thread.
//!
//! ```text
//!   application threads          I/O thread
//!          │                         │
//!   Session::send ──► Transport::send │
//!          │                         ├──► on_open
//!          │                         ├──► on_document ──► Session dispatch
//!          │                         └──► on_close / on_parse_error
//! ```

mod memory;

pub use memory::MemoryTransport;

use std::sync::Arc;

use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::resolve::ServerAddr;

/// Attributes of the server's stream header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stream id assigned by the server.
    pub id: Option<String>,
    /// Server domain.
    pub from: Option<String>,
    /// Protocol version (`1.0` for RFC6120 servers).
    pub version: Option<String>,
}

impl StreamInfo {
    /// Header for an RFC6120 stream from `domain`.
    pub fn new(id: &str, domain: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            from: Some(domain.to_string()),
            version: Some("1.0".to_string()),
        }
    }
}

/// Receiver of transport events.
pub trait TransportListener: Send + Sync {
    /// The server opened (or reopened) its stream.
    fn on_open(&self, stream: &StreamInfo);

    /// A complete top-level document arrived.
    fn on_document(&self, document: Element);

    /// The connection closed, cleanly or not.
    fn on_close(&self);

    /// Incoming bytes could not be parsed; the stream is unusable.
    fn on_parse_error(&self, reason: &str);
}

/// Byte-stream backend for a session.
pub trait Transport: Send + Sync {
    /// Connect to `addr` and start the stream. Events go to `listener`.
    fn open(&self, addr: &ServerAddr, listener: Arc<dyn TransportListener>) -> Result<()>;

    /// Serialize and write one document.
    fn send(&self, document: &Element) -> Result<()>;

    /// Close the stream and then the connection.
    fn close(&self) -> Result<()>;

    /// Upgrade the connection to TLS in place.
    fn start_tls(&self) -> Result<()> {
        Err(XmppError::Transport(format!(
            "{} transport does not support TLS",
            self.name()
        )))
    }

    /// Send a fresh stream header over the same connection.
    fn restart(&self) -> Result<()>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}
