//! Client session: stream lifecycle, module dispatch and request correlation.
//!
//! A [`Session`] owns its configuration, its transport, the state machine,
//! the module registry and the pending-request table. It registers itself as
//! the transport's listener and drives everything from those callbacks:
//!
//! ```text
//!  open() ──► [connecting] ──on_open──► [negotiating] ──bind──► [bound]
//!                 │                          │                    │
//!                 │ error/close              │ error              │ close()/on_close/error
//!                 ▼                          ▼                    ▼
//!             [closed] ◄──────on_close──── [closing] ◄────────────┘
//! ```
//!
//! Inbound stanzas in `bound` are routed in this order:
//!
//! 1. `result`/`error` IQs complete the pending request with the same id and
//!    go nowhere else. Unmatched responses are dropped.
//! 2. Everything else is offered to modules in registration order until one
//!    consumes it.
//! 3. A `get`/`set` IQ nobody consumed is answered with
//!    `service-unavailable`.
//!
//! # Locking
//!
//! No session lock is held while calling the transport, a module or a
//! listener. Modules and listeners may therefore call back into the session
//! freely, with one exception: blocking on a correlated response from the
//! transport thread deadlocks, because that thread delivers the response.

mod listener;
mod negotiation;
mod pending;
mod state;

pub use listener::SessionListener;
pub use pending::PendingRequest;
pub use state::SessionState;

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use self::listener::Notifier;
use self::negotiation::{Action, Negotiator};
use self::pending::PendingTable;
use crate::config::SessionConfig;
use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::features::StreamFeatures;
use crate::jid::Jid;
use crate::module::{self, Module, ModuleRegistry};
use crate::ns;
use crate::resolve::{Resolver, ServerAddr, StaticResolver, CLIENT_SERVICE};
use crate::stanza::{Iq, Stanza, StanzaError};
use crate::transport::{StreamInfo, Transport, TransportListener};

struct Inner {
    id: String,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    resolver: Box<dyn Resolver>,
    state: Mutex<SessionState>,
    modules: Mutex<ModuleRegistry>,
    listeners: Mutex<Vec<Arc<dyn SessionListener>>>,
    notifier: Notifier,
    pending: Arc<PendingTable>,
    negotiation: Mutex<Negotiator>,
    jid: Mutex<Option<Jid>>,
    features: Mutex<Option<StreamFeatures>>,
    last_error: Mutex<Option<String>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let failed = self.pending.fail_all();
        if self.state.get_mut().is_active() {
            tracing::debug!(session = %self.id, failed, "session dropped while active");
            if let Err(e) = self.transport.close() {
                tracing::warn!(session = %self.id, error = %e, "transport close failed on drop");
            }
        }
    }
}

/// Handle to a client session. Cheap to clone; every clone is the same
/// session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

/// Non-owning session handle, for modules and listeners that need to reach
/// the session later without keeping it alive.
#[derive(Clone, Default)]
pub struct WeakSession {
    inner: Weak<Inner>,
}

impl WeakSession {
    /// The session, if it still exists.
    pub fn upgrade(&self) -> Option<Session> {
        self.inner.upgrade().map(|inner| Session { inner })
    }
}

impl std::fmt::Debug for WeakSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakSession")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("domain", &self.inner.config.domain)
            .field("state", &self.state())
            .field("transport", &self.inner.transport.name())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a closed session. Addresses are resolved by a
    /// [`StaticResolver`], i.e. `domain:5222` unless SRV is disabled.
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_resolver(config, transport, StaticResolver::new())
    }

    /// Create a closed session that resolves addresses with `resolver`.
    pub fn with_resolver(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        resolver: impl Resolver + 'static,
    ) -> Self {
        let negotiation = Negotiator::new(&config);
        Self {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().to_string(),
                config,
                transport,
                resolver: Box::new(resolver),
                state: Mutex::new(SessionState::Closed),
                modules: Mutex::new(ModuleRegistry::new()),
                listeners: Mutex::new(Vec::new()),
                notifier: Notifier::default(),
                pending: Arc::new(PendingTable::new()),
                negotiation: Mutex::new(negotiation),
                jid: Mutex::new(None),
                features: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Non-owning handle to this session.
    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Session id, used to tag log records.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Identity assigned by resource binding, once bound.
    pub fn jid(&self) -> Option<Jid> {
        self.inner.jid.lock().clone()
    }

    /// Most recently advertised stream features.
    pub fn features(&self) -> Option<StreamFeatures> {
        self.inner.features.lock().clone()
    }

    /// Why the last stream ended, if it ended abnormally.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// Ids of requests still awaiting a response.
    pub fn pending_ids(&self) -> Vec<String> {
        self.inner.pending.ids()
    }

    /// Whether a request with this id is outstanding.
    pub fn is_pending(&self, id: &str) -> bool {
        self.inner.pending.contains(id)
    }

    /// Number of outstanding requests.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    // ── lifecycle ──────────────────────────────────────────────────────

    /// Resolve the server and open the transport.
    ///
    /// Returns once the transport accepted the connection; negotiation
    /// continues from transport callbacks. Only allowed while `closed`.
    pub fn open(&self) -> Result<()> {
        self.inner.config.validate()?;
        self.transition(SessionState::Connecting, "open")?;

        *self.inner.negotiation.lock() = Negotiator::new(&self.inner.config);
        *self.inner.jid.lock() = None;
        *self.inner.features.lock() = None;
        *self.inner.last_error.lock() = None;

        let candidates = match self.candidates() {
            Ok(candidates) => candidates,
            Err(e) => {
                self.abort_connect(&e);
                return Err(e);
            },
        };

        let listener: Arc<dyn TransportListener> = Arc::new(StreamEvents(self.downgrade()));
        let mut last_error = None;
        for addr in &candidates {
            tracing::debug!(session = %self.inner.id, %addr, transport = self.inner.transport.name(), "connecting");
            match self.inner.transport.open(addr, Arc::clone(&listener)) {
                Ok(()) => {
                    tracing::info!(session = %self.inner.id, %addr, "transport connected");
                    return Ok(());
                },
                Err(e) => {
                    tracing::warn!(session = %self.inner.id, %addr, error = %e, "connect failed");
                    last_error = Some(e);
                },
            }
        }

        let err = last_error.unwrap_or_else(|| {
            XmppError::Resolve(format!("no candidates for {}", self.inner.config.domain))
        });
        self.abort_connect(&err);
        Err(err)
    }

    fn candidates(&self) -> Result<Vec<ServerAddr>> {
        let config = &self.inner.config;
        if config.disable_srv {
            return Ok(vec![ServerAddr::new(config.direct_host(), config.direct_port())]);
        }
        self.inner
            .resolver
            .resolve(&config.domain, CLIENT_SERVICE, config.protocol)
    }

    fn abort_connect(&self, err: &XmppError) {
        *self.inner.last_error.lock() = Some(err.to_string());
        self.try_transition(SessionState::Closed);
    }

    /// Close the stream.
    ///
    /// Moves to `closing`, fails every outstanding request and asks the
    /// transport to close; `closed` follows when the transport confirms.
    /// A no-op on a session that is already closed or closing.
    pub fn close(&self) -> Result<()> {
        if matches!(self.state(), SessionState::Closed | SessionState::Closing) {
            return Ok(());
        }
        if self.try_transition(SessionState::Closing).is_none() {
            return Ok(());
        }

        if let Err(e) = self.inner.transport.close() {
            tracing::warn!(session = %self.inner.id, error = %e, "transport close failed");
            *self.inner.last_error.lock() = Some(e.to_string());
            self.try_transition_from(SessionState::Closing, SessionState::Closed);
            return Err(e);
        }
        Ok(())
    }

    // ── state machine ──────────────────────────────────────────────────

    /// Move to `to` or report why not.
    fn transition(&self, to: SessionState, operation: &'static str) -> Result<SessionState> {
        let from = self.set_state(|from| from.can_transition_to(to).then_some(to));
        from.ok_or_else(|| XmppError::InvalidState {
            operation,
            state: self.state(),
        })
    }

    /// Move to `to` if the state machine allows it from the current state.
    fn try_transition(&self, to: SessionState) -> Option<SessionState> {
        self.set_state(|from| from.can_transition_to(to).then_some(to))
    }

    /// Move to `to` only if the session is still in `from`.
    fn try_transition_from(&self, from: SessionState, to: SessionState) -> Option<SessionState> {
        self.set_state(|current| (current == from && current.can_transition_to(to)).then_some(to))
    }

    /// Apply `next` to the state under the lock, then notify listeners.
    ///
    /// Entering `bound` opens the pending table; entering `closing` or
    /// `closed` fails everything in it. Both happen under the state lock so
    /// no request slips in between the check in `submit_request` and the
    /// transition. The notification is queued under the same lock, which
    /// keeps listener order equal to transition order across threads.
    fn set_state(&self, next: impl FnOnce(SessionState) -> Option<SessionState>) -> Option<SessionState> {
        let (from, to, seq) = {
            let mut state = self.inner.state.lock();
            let from = *state;
            let to = next(from)?;
            match to {
                SessionState::Bound => self.inner.pending.accept(),
                SessionState::Closing | SessionState::Closed => {
                    let failed = self.inner.pending.fail_all();
                    if failed > 0 {
                        tracing::debug!(session = %self.inner.id, failed, "failed outstanding requests");
                    }
                },
                _ => {},
            }
            *state = to;
            (from, to, self.inner.notifier.enqueue(from, to))
        };

        tracing::info!(session = %self.inner.id, from = %from, to = %to, "state changed");
        self.inner.notifier.deliver(seq, |from, to| {
            let listeners = self.inner.listeners.lock().clone();
            for listener in listeners {
                listener.on_state_change(self, to, from);
            }
        });
        Some(from)
    }

    /// End the stream after an unrecoverable error: `closing`, transport
    /// close, `closed`.
    fn fail(&self, err: XmppError) {
        let state = self.state();
        if state == SessionState::Closed {
            tracing::debug!(session = %self.inner.id, error = %err, "error after close ignored");
            return;
        }
        tracing::error!(session = %self.inner.id, %state, error = %err, "stream failed");
        *self.inner.last_error.lock() = Some(err.to_string());

        match state {
            SessionState::Closed => return,
            SessionState::Connecting => {
                self.try_transition(SessionState::Closed);
                self.close_transport();
                return;
            },
            SessionState::Closing => {},
            SessionState::Negotiating | SessionState::Bound => {
                self.try_transition(SessionState::Closing);
            },
        }
        self.close_transport();
        self.try_transition_from(SessionState::Closing, SessionState::Closed);
    }

    fn close_transport(&self) {
        if let Err(e) = self.inner.transport.close() {
            tracing::debug!(session = %self.inner.id, error = %e, "transport close failed");
        }
    }

    // ── transport events ───────────────────────────────────────────────

    fn handle_open(&self, stream: &StreamInfo) {
        match self.state() {
            SessionState::Connecting => {
                tracing::debug!(
                    session = %self.inner.id,
                    stream_id = ?stream.id,
                    from = ?stream.from,
                    version = ?stream.version,
                    "stream opened"
                );
                self.try_transition(SessionState::Negotiating);
            },
            SessionState::Negotiating => {
                tracing::debug!(session = %self.inner.id, stream_id = ?stream.id, "stream restarted");
            },
            state => {
                tracing::warn!(session = %self.inner.id, %state, "ignoring stream header");
            },
        }
    }

    fn handle_document(&self, el: Element) {
        tracing::trace!(session = %self.inner.id, "recv {}", el);

        if el.is("error", ns::STREAM) {
            let condition = el
                .children()
                .find(|c| c.ns() == ns::STREAMS && c.name() != "text")
                .map_or("undefined-condition", Element::name);
            self.fail(XmppError::Protocol(format!("stream error: {condition}")));
            return;
        }

        match self.state() {
            SessionState::Negotiating => self.negotiate(&el),
            SessionState::Bound => self.route(&el),
            state => {
                tracing::debug!(session = %self.inner.id, %state, element = el.name(), "dropping document");
            },
        }
    }

    fn handle_close(&self) {
        match self.state() {
            SessionState::Closed => {},
            SessionState::Closing => {
                self.try_transition(SessionState::Closed);
            },
            SessionState::Connecting => {
                *self.inner.last_error.lock() = Some("connection closed before stream open".to_string());
                self.try_transition(SessionState::Closed);
            },
            state @ (SessionState::Negotiating | SessionState::Bound) => {
                tracing::info!(session = %self.inner.id, %state, "stream closed by peer");
                if state == SessionState::Negotiating {
                    *self.inner.last_error.lock() = Some("stream closed during negotiation".to_string());
                }
                self.try_transition(SessionState::Closing);
                self.try_transition_from(SessionState::Closing, SessionState::Closed);
            },
        }
    }

    fn negotiate(&self, el: &Element) {
        let result = {
            let mut negotiation = self.inner.negotiation.lock();
            tracing::debug!(session = %self.inner.id, phase = negotiation.phase(), element = el.name(), "negotiating");
            negotiation.handle(el)
        };

        let actions = match result {
            Ok(actions) => actions,
            Err(e) => return self.fail(e),
        };
        for action in actions {
            if let Err(e) = self.apply(action) {
                return self.fail(e);
            }
        }
    }

    fn apply(&self, action: Action) -> Result<()> {
        let transport = &self.inner.transport;
        match action {
            Action::Features(features) => {
                *self.inner.features.lock() = Some(features.clone());
                let listeners = self.inner.listeners.lock().clone();
                for listener in listeners {
                    listener.on_features(self, &features);
                }
            },
            Action::Send(el) => {
                tracing::trace!(session = %self.inner.id, "send {}", el);
                transport.send(&el)?;
            },
            Action::StartTls => {
                tracing::debug!(session = %self.inner.id, "upgrading to TLS");
                transport.start_tls()?;
            },
            Action::Restart => {
                tracing::debug!(session = %self.inner.id, "restarting stream");
                transport.restart()?;
            },
            Action::Bound(jid) => {
                tracing::info!(session = %self.inner.id, %jid, "resource bound");
                *self.inner.jid.lock() = Some(jid);
                self.try_transition(SessionState::Bound);
            },
        }
        Ok(())
    }

    fn route(&self, el: &Element) {
        if !Stanza::is_stanza(el) {
            tracing::debug!(session = %self.inner.id, element = el.name(), ns = el.ns(), "ignoring non-stanza");
            return;
        }
        let stanza = match Stanza::try_from(el) {
            Ok(stanza) => stanza,
            Err(e) => {
                tracing::warn!(session = %self.inner.id, error = %e, "dropping malformed stanza");
                return;
            },
        };

        let stanza = match stanza {
            Stanza::Iq(iq) if iq.kind.is_response() => {
                if let Err(iq) = self.inner.pending.complete(iq) {
                    tracing::warn!(
                        session = %self.inner.id,
                        id = iq.id(),
                        from = ?iq.header.from.as_ref().map(Jid::to_string),
                        "discarding unsolicited response"
                    );
                }
                return;
            },
            other => other,
        };

        let modules = self.inner.modules.lock().snapshot();
        if let Some(name) = module::dispatch(&modules, self, &stanza) {
            tracing::debug!(session = %self.inner.id, kind = stanza.kind_name(), id = stanza.id(), module = name, "stanza consumed");
            return;
        }

        match &stanza {
            Stanza::Iq(iq) if iq.kind.is_request() => {
                tracing::debug!(
                    session = %self.inner.id,
                    id = iq.id(),
                    payload = ?iq.payload_ns(),
                    "no handler, replying service-unavailable"
                );
                let reply = iq.error_reply(StanzaError::service_unavailable());
                if let Err(e) = self.inner.transport.send(&Element::from(&reply)) {
                    tracing::warn!(session = %self.inner.id, error = %e, "failed to send error reply");
                }
            },
            _ => {
                tracing::debug!(session = %self.inner.id, kind = stanza.kind_name(), id = stanza.id(), "stanza unhandled");
            },
        }
    }

    // ── sending ────────────────────────────────────────────────────────

    /// Send a stanza without waiting for anything. Requires `bound`.
    ///
    /// An IQ without an id gets a generated one. Responses to requests sent
    /// this way are not correlated; use [`Session::submit_request`] for that.
    pub fn send(&self, stanza: impl Into<Stanza>) -> Result<()> {
        let state = self.state();
        if state != SessionState::Bound {
            return Err(XmppError::NotBound(state));
        }
        let mut stanza = stanza.into();
        if matches!(stanza, Stanza::Iq(_)) && stanza.id().is_empty() {
            stanza.header_mut().id = new_id();
        }
        let el = Element::from(&stanza);
        tracing::trace!(session = %self.inner.id, "send {}", el);
        self.inner.transport.send(&el)
    }

    /// Send a `get`/`set` request and return a handle to its response.
    ///
    /// An empty id is replaced by a random UUID. The pending entry exists
    /// before the request reaches the transport. `timeout` bounds
    /// [`PendingRequest::wait`]; `None` waits until a response arrives or
    /// the session closes.
    pub fn submit_request(&self, mut iq: Iq, timeout: Option<Duration>) -> Result<PendingRequest> {
        if !iq.kind.is_request() {
            return Err(XmppError::InvalidStanza(format!(
                "only get/set expect a response, not {}",
                iq.kind.as_str()
            )));
        }
        let state = self.state();
        if state != SessionState::Bound {
            return Err(XmppError::NotBound(state));
        }
        if iq.header.id.is_empty() {
            iq.header.id = new_id();
        }

        let pending = self
            .inner
            .pending
            .insert(&iq.header.id, iq.header.to.clone(), timeout)?;
        let el = Element::from(&iq);
        tracing::debug!(session = %self.inner.id, id = iq.id(), payload = ?iq.payload_ns(), "request submitted");
        tracing::trace!(session = %self.inner.id, "send {}", el);
        // Dropping `pending` on failure withdraws the entry
        self.inner.transport.send(&el)?;
        Ok(pending)
    }

    /// Send a request and block until its response.
    ///
    /// `timeout` of `None` falls back to the configured request timeout. An
    /// `error` response is returned as `Ok`; see [`Iq::into_result`].
    ///
    /// Must not be called from the transport thread (module or listener
    /// callbacks): the response could never be delivered.
    pub fn send_request(&self, iq: Iq, timeout: Option<Duration>) -> Result<Iq> {
        let timeout = timeout.or_else(|| self.inner.config.request_timeout());
        self.submit_request(iq, timeout)?.wait()
    }

    // ── modules ────────────────────────────────────────────────────────

    /// Add a module at the end of the dispatch order and run its
    /// `registered` hook.
    pub fn register(&self, module: Arc<dyn Module>) -> Result<()> {
        self.inner.modules.lock().insert(Arc::clone(&module))?;
        tracing::debug!(session = %self.inner.id, module = module.name(), "module registered");
        module.registered(self);
        Ok(())
    }

    /// Remove a module by name and run its `unregistered` hook.
    pub fn unregister(&self, name: &str) -> Result<Arc<dyn Module>> {
        let module = self
            .inner
            .modules
            .lock()
            .remove(name)
            .ok_or_else(|| XmppError::ModuleNotFound(name.to_string()))?;
        tracing::debug!(session = %self.inner.id, module = name, "module unregistered");
        module.unregistered(self);
        Ok(module)
    }

    /// Registered module by name.
    pub fn module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.inner.modules.lock().get(name)
    }

    /// Registered module names in dispatch order.
    pub fn module_names(&self) -> Vec<String> {
        self.inner.modules.lock().names()
    }

    /// Union of every module's disco features.
    pub fn disco_features(&self) -> BTreeSet<String> {
        self.inner.modules.lock().disco_features()
    }

    // ── listeners ──────────────────────────────────────────────────────

    /// Add a listener; listeners are notified in the order they were added.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.inner.listeners.lock().push(listener);
    }

    /// Remove a listener previously added. Returns whether it was found.
    pub fn remove_listener<L: SessionListener + ?Sized>(&self, listener: &Arc<L>) -> bool {
        let target = Arc::as_ptr(listener).cast::<()>();
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| Arc::as_ptr(l).cast::<()>() != target);
        listeners.len() != before
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Transport listener installed by [`Session::open`]. Holds the session
/// weakly so the transport never keeps it alive.
struct StreamEvents(WeakSession);

impl TransportListener for StreamEvents {
    fn on_open(&self, stream: &StreamInfo) {
        if let Some(session) = self.0.upgrade() {
            session.handle_open(stream);
        }
    }

    fn on_document(&self, document: Element) {
        if let Some(session) = self.0.upgrade() {
            session.handle_document(document);
        }
    }

    fn on_close(&self) {
        if let Some(session) = self.0.upgrade() {
            session.handle_close();
        }
    }

    fn on_parse_error(&self, reason: &str) {
        if let Some(session) = self.0.upgrade() {
            session.fail(XmppError::Parse(reason.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::TlsPolicy;
    use crate::transport::MemoryTransport;

    fn config() -> SessionConfig {
        SessionConfig::new("example.com")
            .with_server("host1", 5222)
            .with_srv_disabled()
            .with_tls(TlsPolicy::Disabled)
    }

    fn bind_result(request: &Element) -> Element {
        Element::new("iq", ns::CLIENT)
            .with_attr("type", "result")
            .with_attr("id", request.attr("id").unwrap_or_default())
            .with_child(
                Element::new("bind", ns::BIND)
                    .with_child(Element::new("jid", ns::BIND).with_text("anon@example.com/r1")),
            )
    }

    fn bound_session() -> (Session, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let session = Session::new(config(), transport.clone());
        session.open().unwrap();
        transport.deliver_open(&StreamInfo::new("s1", "example.com"));
        transport.deliver(Element::new("features", ns::STREAM).with_child(Element::new("bind", ns::BIND)));
        let request = transport.last_sent().unwrap();
        transport.deliver(bind_result(&request));
        assert_eq!(session.state(), SessionState::Bound);
        (session, transport)
    }

    #[test]
    fn test_open_twice_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        let session = Session::new(config(), transport);
        session.open().unwrap();
        assert!(matches!(
            session.open(),
            Err(XmppError::InvalidState { operation: "open", state: SessionState::Connecting })
        ));
    }

    #[test]
    fn test_open_uses_direct_address() {
        let transport = Arc::new(MemoryTransport::new());
        let session = Session::new(config(), transport.clone());
        session.open().unwrap();
        assert_eq!(transport.connected_to(), Some(ServerAddr::new("host1", 5222)));
    }

    #[test]
    fn test_open_tries_next_candidate() {
        let transport = Arc::new(MemoryTransport::new());
        transport.refuse_host("a.example.com");
        let resolver = StaticResolver::new().with_entry(
            "example.com",
            vec![
                ServerAddr::new("a.example.com", 5222),
                ServerAddr::new("b.example.com", 5223),
            ],
        );
        let config = SessionConfig::new("example.com").with_tls(TlsPolicy::Disabled);
        let session = Session::with_resolver(config, transport.clone(), resolver);
        session.open().unwrap();
        assert_eq!(transport.attempts().len(), 2);
        assert_eq!(transport.connected_to(), Some(ServerAddr::new("b.example.com", 5223)));
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_open_fails_when_all_candidates_refuse() {
        let transport = Arc::new(MemoryTransport::new());
        transport.refuse_host("host1");
        let session = Session::new(config(), transport);
        assert!(matches!(session.open(), Err(XmppError::Transport(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.last_error().is_some());
    }

    #[test]
    fn test_send_requires_bound() {
        let transport = Arc::new(MemoryTransport::new());
        let session = Session::new(config(), transport);
        let presence = crate::stanza::Presence::available();
        assert!(matches!(
            session.send(presence),
            Err(XmppError::NotBound(SessionState::Closed))
        ));
    }

    #[test]
    fn test_send_assigns_iq_id() {
        let (session, transport) = bound_session();
        let iq = Iq::get(Element::new("query", "jabber:iq:version"));
        session.send(iq).unwrap();
        let sent = transport.last_sent().unwrap();
        assert!(!sent.attr("id").unwrap_or_default().is_empty());
        assert!(session.pending_ids().is_empty());
    }

    #[test]
    fn test_submit_rejects_responses() {
        let (session, _transport) = bound_session();
        let iq = Iq::get(Element::new("ping", ns::PING)).result_reply(None);
        assert!(matches!(
            session.submit_request(iq, None),
            Err(XmppError::InvalidStanza(_))
        ));
    }

    #[test]
    fn test_stream_error_is_fatal() {
        let (session, transport) = bound_session();
        let error = Element::new("error", ns::STREAM).with_child(Element::new("conflict", ns::STREAMS));
        transport.deliver(error);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(transport.close_count(), 1);
        assert!(session.last_error().unwrap().contains("conflict"));
    }

    #[test]
    fn test_remove_listener() {
        struct Counting(AtomicUsize);
        impl SessionListener for Counting {
            fn on_state_change(&self, _: &Session, _: SessionState, _: SessionState) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let transport = Arc::new(MemoryTransport::new());
        let session = Session::new(config(), transport);
        let listener = Arc::new(Counting(AtomicUsize::new(0)));
        session.add_listener(listener.clone());
        session.open().unwrap();
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);

        assert!(session.remove_listener(&listener));
        assert!(!session.remove_listener(&listener));
        session.close().unwrap();
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes_transport() {
        let (session, transport) = bound_session();
        let pending = session
            .submit_request(Iq::get(Element::new("ping", ns::PING)), None)
            .unwrap();
        drop(session);
        assert_eq!(transport.close_count(), 1);
        assert!(matches!(pending.wait(), Err(XmppError::SessionClosed)));
    }
}
