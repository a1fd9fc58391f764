//! # jabber-core - Client-side XMPP Session Core
//!
//! Stream negotiation, extension-module dispatch and request/response
//! correlation for an RFC6120/6121 client, built on plain threads.
//!
//! ## Features
//!
//! - **Session state machine**: `closed → connecting → negotiating → bound →
//!   closing → closed`, with STARTTLS, SASL and resource binding driven from
//!   transport callbacks
//! - **Module dispatch**: pluggable extensions see inbound stanzas in
//!   registration order; the first one to consume a stanza ends dispatch
//! - **Request correlation**: blocking and non-blocking IQ requests with
//!   generated ids, timeouts and guaranteed release on session close
//! - **Pluggable I/O**: transports and resolvers are traits; an in-memory
//!   transport ships for tests and custom event loops
//!
//! ## Architecture
//!
//! ```text
//!  application threads                              transport I/O thread
//!  ───────────────────                              ────────────────────
//!  Session::open ──► Resolver ──► Transport::open
//!                                                   on_open ─────────┐
//!  Session::send_request                            on_document ─────┤
//!     │ insert pending entry                        on_close ────────┤
//!     │ Transport::send                             on_parse_error ──┤
//!     │ wait (Semaphore)                                             ▼
//!     │                                                 ┌──── Session ────┐
//!     │                                                 │ state machine   │
//!     │                                                 │ negotiation     │
//!     ◄──────────── response completes entry ───────────│ pending table   │
//!                                                       │ module dispatch │──► Module::consume
//!                                                       └─────────────────┘──► SessionListener
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use jabber::modules::{Disco, KeepAlive, Ping};
//! use jabber::{Session, SessionConfig};
//!
//! let config = SessionConfig::new("example.com")
//!     .with_credentials("juliet", "r0m30")
//!     .with_resource("balcony");
//! let session = Session::new(config, Arc::new(my_tcp_transport));
//!
//! session.register(Arc::new(Disco::default()))?;
//! session.register(Arc::new(Ping::new()))?;
//! session.register(Arc::new(KeepAlive::new(Duration::from_secs(60))))?;
//! session.open()?;
//!
//! // ... once bound, from an application thread:
//! let rtt = Ping::ping(&session, None, Some(Duration::from_secs(5)))?;
//! ```
//!
//! ## Modules
//!
//! - [`session`]: the session, its state machine and listeners
//! - [`module`]: the extension contract and registry
//! - [`modules`]: built-in extensions (disco, ping, keep-alive, messaging)
//! - [`stanza`]: typed IQ, message and presence views
//! - [`transport`]: transport contract and in-memory transport
//! - [`resolve`]: RFC2782 SRV ordering and resolver contract
//! - [`sync`]: counting semaphore
//! - [`config`]: session configuration
//! - [`error`]: error types and result aliases

pub mod config;
pub mod document;
pub mod error;
pub mod features;
pub mod jid;
pub mod module;
pub mod modules;
pub mod ns;
pub mod resolve;
pub mod sasl;
pub mod session;
pub mod stanza;
pub mod sync;
pub mod transport;

// Re-exports for convenience
pub use config::{Credentials, SessionConfig, TlsPolicy, TransportProtocol};
pub use document::Element;
pub use error::{Result, XmppError};
pub use features::StreamFeatures;
pub use jid::{Jid, JidError};
pub use module::{Module, ModuleRegistry};
pub use resolve::{Resolver, ServerAddr, SrvLookup, SrvRecord, SrvResolver, StaticResolver};
pub use session::{PendingRequest, Session, SessionListener, SessionState, WeakSession};
pub use stanza::{Iq, IqType, Message, MessageType, Presence, Stanza, StanzaError};
pub use sync::Semaphore;
pub use transport::{MemoryTransport, StreamInfo, Transport, TransportListener};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
