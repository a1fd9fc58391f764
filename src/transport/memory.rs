//! In-process transport.
//!
//! Records everything the session writes and lets the caller inject server
//! events by hand. Useful for tests and for embedding a session behind a
//! custom I/O loop. Injection methods call the listener on the caller's
//! thread; the caller plays the role of the I/O thread and must not inject
//! from two threads at once.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{StreamInfo, Transport, TransportListener};
use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::resolve::ServerAddr;

#[derive(Default)]
struct MemoryState {
    listener: Option<Arc<dyn TransportListener>>,
    connected: Option<ServerAddr>,
    attempts: Vec<ServerAddr>,
    unreachable: HashSet<String>,
    sent: Vec<Element>,
    closes: usize,
    restarts: usize,
    secure: bool,
}

/// Loopback transport driven by explicit `deliver_*` calls.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    confirm_close: bool,
}

impl MemoryTransport {
    /// Create an idle transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that reports `on_close` as soon as it is closed.
    pub fn with_close_confirmation() -> Self {
        Self {
            state: Mutex::default(),
            confirm_close: true,
        }
    }

    /// Make `open` fail for this host.
    pub fn refuse_host(&self, host: &str) {
        self.state.lock().unreachable.insert(host.to_string());
    }

    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.state.lock().listener.clone()
    }

    /// Report the server's stream header.
    pub fn deliver_open(&self, stream: &StreamInfo) {
        if let Some(listener) = self.listener() {
            listener.on_open(stream);
        }
    }

    /// Report an incoming document.
    pub fn deliver(&self, document: Element) {
        if let Some(listener) = self.listener() {
            listener.on_document(document);
        }
    }

    /// Report that the connection closed.
    pub fn deliver_close(&self) {
        let listener = {
            let mut state = self.state.lock();
            state.connected = None;
            state.listener.take()
        };
        if let Some(listener) = listener {
            listener.on_close();
        }
    }

    /// Report a parse failure.
    pub fn deliver_parse_error(&self, reason: &str) {
        if let Some(listener) = self.listener() {
            listener.on_parse_error(reason);
        }
    }

    /// Every document sent so far.
    pub fn sent(&self) -> Vec<Element> {
        self.state.lock().sent.clone()
    }

    /// Drain the sent documents.
    pub fn take_sent(&self) -> Vec<Element> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Most recently sent document.
    pub fn last_sent(&self) -> Option<Element> {
        self.state.lock().sent.last().cloned()
    }

    /// Address of the current connection.
    pub fn connected_to(&self) -> Option<ServerAddr> {
        self.state.lock().connected.clone()
    }

    /// Every address `open` was called with, in order.
    pub fn attempts(&self) -> Vec<ServerAddr> {
        self.state.lock().attempts.clone()
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    /// Number of stream restarts.
    pub fn restart_count(&self) -> usize {
        self.state.lock().restarts
    }

    /// Whether `start_tls` has been called.
    pub fn is_secure(&self) -> bool {
        self.state.lock().secure
    }
}

impl Transport for MemoryTransport {
    fn open(&self, addr: &ServerAddr, listener: Arc<dyn TransportListener>) -> Result<()> {
        let mut state = self.state.lock();
        state.attempts.push(addr.clone());
        if state.unreachable.contains(&addr.host) {
            return Err(XmppError::Transport(format!("connection refused: {addr}")));
        }
        state.connected = Some(addr.clone());
        state.listener = Some(listener);
        state.secure = false;
        Ok(())
    }

    fn send(&self, document: &Element) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected.is_none() {
            return Err(XmppError::Transport("not connected".to_string()));
        }
        tracing::trace!(transport = "memory", "send {}", document);
        state.sent.push(document.clone());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.lock().closes += 1;
        if self.confirm_close {
            self.deliver_close();
        }
        Ok(())
    }

    fn start_tls(&self) -> Result<()> {
        self.state.lock().secure = true;
        Ok(())
    }

    fn restart(&self) -> Result<()> {
        self.state.lock().restarts += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
