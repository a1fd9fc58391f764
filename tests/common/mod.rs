//! Shared harness: a scripted server on top of `MemoryTransport`.
//!
//! The test thread plays the transport I/O thread. Only it injects events;
//! application-side calls may run on spawned threads.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jabber::{ns, Element, MemoryTransport, Session, SessionConfig, SessionState, StreamInfo, TlsPolicy};

/// Install a test-writer subscriber once. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// The scenario config: direct connection to host1:5222, no TLS.
pub fn direct_config() -> SessionConfig {
    SessionConfig::new("example.com")
        .with_server("host1", 5222)
        .with_srv_disabled()
        .with_tls(TlsPolicy::Disabled)
        .with_request_timeout(None)
}

pub fn features(children: Vec<Element>) -> Element {
    children
        .into_iter()
        .fold(Element::new("features", ns::STREAM), Element::with_child)
}

pub fn bind_feature() -> Element {
    Element::new("bind", ns::BIND)
}

pub fn mechanisms(names: &[&str]) -> Element {
    names.iter().fold(Element::new("mechanisms", ns::SASL), |el, name| {
        el.with_child(Element::new("mechanism", ns::SASL).with_text(*name))
    })
}

/// `<iq type="result"/>` answering `request`, optionally from `from`.
pub fn result_for(request: &Element, from: Option<&str>) -> Element {
    Element::new("iq", ns::CLIENT)
        .with_attr("type", "result")
        .with_attr("id", request.attr("id").unwrap_or_default())
        .with_opt_attr("from", from)
}

pub fn result_with_id(id: &str) -> Element {
    Element::new("iq", ns::CLIENT)
        .with_attr("type", "result")
        .with_attr("id", id)
}

pub fn bind_result(request: &Element, jid: &str) -> Element {
    result_for(request, None).with_child(
        Element::new("bind", ns::BIND).with_child(Element::new("jid", ns::BIND).with_text(jid)),
    )
}

/// An inbound `<iq type="get"/>` from the server carrying `payload`.
pub fn incoming_get(id: &str, payload: Element) -> Element {
    Element::new("iq", ns::CLIENT)
        .with_attr("type", "get")
        .with_attr("id", id)
        .with_attr("from", "example.com")
        .with_attr("to", "juliet@example.com/balcony")
        .with_child(payload)
}

pub fn chat(from: &str, body: &str) -> Element {
    Element::new("message", ns::CLIENT)
        .with_attr("type", "chat")
        .with_attr("from", from)
        .with_child(Element::new("body", ns::CLIENT).with_text(body))
}

/// Drive an opened session through features and bind.
pub fn bind(session: &Session, transport: &MemoryTransport) {
    transport.deliver_open(&StreamInfo::new("s1", "example.com"));
    transport.deliver(features(vec![bind_feature()]));
    let request = transport.last_sent().expect("bind request");
    transport.deliver(bind_result(&request, "juliet@example.com/balcony"));
    assert_eq!(session.state(), SessionState::Bound);
}

/// A bound session over a fresh transport.
pub fn bound_session(config: SessionConfig) -> (Session, Arc<MemoryTransport>) {
    init_tracing();
    let transport = Arc::new(MemoryTransport::new());
    let session = Session::new(config, transport.clone());
    session.open().expect("open");
    bind(&session, &transport);
    transport.take_sent();
    (session, transport)
}

/// Poll until `condition` holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Wait for the session to write an element matching `predicate`.
pub fn expect_sent(transport: &MemoryTransport, mut predicate: impl FnMut(&Element) -> bool) -> Element {
    let mut found = None;
    let ok = wait_until(Duration::from_secs(5), || {
        found = transport.sent().into_iter().find(|el| predicate(el));
        found.is_some()
    });
    assert!(ok, "expected element was never sent");
    found.expect("element")
}

pub fn is_iq_of(el: &Element, kind: &str) -> bool {
    el.is("iq", ns::CLIENT) && el.attr("type") == Some(kind)
}
