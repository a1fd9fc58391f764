//! Session core error types.
//!
//! # Error Classes
//!
//! - **Transport**: connection or parse failures. Fatal to the current stream;
//!   the session reports them through its `closing` → `closed` transition.
//! - **Protocol**: an unexpected or malformed document during negotiation.
//!   Handled exactly like a transport error.
//! - **Usage**: duplicate module names, operations attempted in the wrong
//!   state. Returned synchronously at the call site.
//! - **Request**: an `error` IQ answering a pending request. Delivered to the
//!   caller as a value (`Ok(Iq)` with type `error`); [`XmppError::Stanza`]
//!   exists only for callers who opt in via [`crate::stanza::Iq::into_result`].
//! - **Timeout**: a correlated wait that expired. Locally recoverable.

use std::time::Duration;

use thiserror::Error;

use crate::jid::JidError;
use crate::session::SessionState;
use crate::stanza::StanzaError;

/// Session core errors.
#[derive(Error, Debug)]
pub enum XmppError {
    /// The byte stream failed (connect, write, unexpected close).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport could not parse an incoming document.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The peer violated the stream protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// SASL authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No usable server address could be found.
    #[error("Resolve error: {0}")]
    Resolve(String),

    /// Invalid session configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A module with this name is already registered.
    #[error("Module already registered: {0}")]
    DuplicateModule(String),

    /// No module with this name is registered.
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// A request with this id is already outstanding.
    #[error("Request id already outstanding: {0}")]
    DuplicateRequestId(String),

    /// Operation not permitted in the current state.
    #[error("Operation not permitted in state {state}: {operation}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// State at the time of the call.
        state: SessionState,
    },

    /// Stanzas can only be sent once the resource is bound.
    #[error("Session not bound (state {0})")]
    NotBound(SessionState),

    /// The session closed while the request was outstanding.
    #[error("Session closed")]
    SessionClosed,

    /// No response arrived within the allotted time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed JID.
    #[error("Invalid JID: {0}")]
    InvalidJid(#[from] JidError),

    /// A document could not be interpreted as a stanza.
    #[error("Invalid stanza: {0}")]
    InvalidStanza(String),

    /// The peer answered a request with an error stanza.
    #[error("Stanza error: {0}")]
    Stanza(StanzaError),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl XmppError {
    /// Whether the error ends the current stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Parse(_) | Self::Protocol(_) | Self::Auth(_) | Self::Io(_)
        )
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, XmppError>;

impl From<base64::DecodeError> for XmppError {
    fn from(err: base64::DecodeError) -> Self {
        XmppError::Protocol(format!("Base64 decode error: {err}"))
    }
}
