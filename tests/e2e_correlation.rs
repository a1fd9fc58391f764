//! End-to-end request/response correlation tests.
//!
//! Application threads block on requests while the test thread plays the
//! server and answers (or doesn't) through the transport.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::*;
use jabber::module::Module;
use jabber::{ns, Element, Iq, IqType, Jid, Session, Stanza, XmppError};
use parking_lot::Mutex;

fn ping() -> Iq {
    Iq::get(Element::new("ping", ns::PING))
}

/// A request without an id gets one, and its result completes it
#[test]
fn test_generated_id_round_trip() {
    let (session, transport) = bound_session(direct_config());

    let pending = session.submit_request(ping(), None).unwrap();
    let id = pending.id().to_string();
    assert!(!id.is_empty());
    assert_eq!(session.pending_ids(), vec![id.clone()]);

    let sent = transport.last_sent().unwrap();
    assert_eq!(sent.attr("id"), Some(id.as_str()));

    transport.deliver(result_for(&sent, None));
    let response = pending.wait().unwrap();
    assert_eq!(response.kind, IqType::Result);
    assert_eq!(response.id(), id);
    assert!(session.pending_ids().is_empty());
}

/// A caller blocked in send_request is woken by the response
#[test]
fn test_blocking_request_from_application_thread() {
    let (session, transport) = bound_session(direct_config());

    let caller = {
        let session = session.clone();
        thread::spawn(move || session.send_request(ping(), Some(Duration::from_secs(5))))
    };

    let request = expect_sent(&transport, |el| is_iq_of(el, "get"));
    transport.deliver(result_for(&request, None));

    let response = caller.join().unwrap().unwrap();
    assert_eq!(Some(response.id()), request.attr("id"));
    assert_eq!(session.pending_count(), 0);
}

/// Closing with N outstanding requests fails all N and empties the table
#[test]
fn test_close_fails_every_waiter() {
    const N: usize = 8;
    let (session, transport) = bound_session(direct_config());

    let callers: Vec<_> = (0..N)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || session.send_request(ping(), None))
        })
        .collect();

    assert!(wait_until(Duration::from_secs(5), || session.pending_count() == N));
    session.close().unwrap();

    for caller in callers {
        assert!(matches!(caller.join().unwrap(), Err(XmppError::SessionClosed)));
    }
    assert_eq!(session.pending_count(), 0);

    // New requests are refused while closing
    assert_eq!(transport.close_count(), 1);
    assert!(matches!(
        session.submit_request(ping(), None),
        Err(XmppError::NotBound(_))
    ));
}

/// A timeout removes only the expired entry
#[test]
fn test_timeout_leaves_other_requests() {
    let (session, transport) = bound_session(direct_config());
    let other = session.submit_request(ping().with_id("other"), None).unwrap();

    let started = Instant::now();
    let timeout = Duration::from_millis(50);
    let result = session.send_request(ping().with_id("slow"), Some(timeout));
    assert!(matches!(result, Err(XmppError::Timeout(t)) if t == timeout));
    assert!(started.elapsed() >= timeout);

    assert_eq!(session.pending_ids(), vec!["other".to_string()]);
    transport.deliver(result_with_id("other"));
    assert!(other.wait().is_ok());

    // A late answer to the expired request is discarded quietly
    transport.deliver(result_with_id("slow"));
    assert_eq!(session.pending_count(), 0);
}

/// Unknown ids are discarded without touching pending entries
#[test]
fn test_unsolicited_response_discarded() {
    let (session, transport) = bound_session(direct_config());
    let pending = session.submit_request(ping().with_id("r1"), None).unwrap();

    transport.deliver(result_with_id("bogus"));
    assert_eq!(session.pending_ids(), vec!["r1".to_string()]);
    assert!(pending.try_take().is_none());

    transport.deliver(result_with_id("r1"));
    assert!(pending.wait().is_ok());
}

/// Responses are one-shot and never reach modules
#[test]
fn test_responses_bypass_modules() {
    struct Spy(Arc<Mutex<Vec<String>>>);
    impl Module for Spy {
        fn name(&self) -> &str {
            "spy"
        }
        fn consume(&self, _session: &Session, stanza: &Stanza) -> bool {
            self.0.lock().push(stanza.id().to_string());
            false
        }
    }

    let (session, transport) = bound_session(direct_config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    session.register(Arc::new(Spy(seen.clone()))).unwrap();

    let pending = session.submit_request(ping().with_id("once"), None).unwrap();
    transport.deliver(result_with_id("once"));
    transport.deliver(result_with_id("once"));
    assert!(pending.wait().is_ok());
    assert!(seen.lock().is_empty());
}

/// An error response is a value, not a failure of the call
#[test]
fn test_error_response_is_returned() {
    let (session, transport) = bound_session(direct_config());
    let pending = session.submit_request(ping().with_id("e1"), None).unwrap();

    transport.deliver(
        result_with_id("e1").with_attr("type", "error").with_child(
            Element::new("error", ns::CLIENT)
                .with_attr("type", "cancel")
                .with_child(Element::new("feature-not-implemented", ns::STANZAS)),
        ),
    );

    let response = pending.wait().unwrap();
    assert_eq!(response.kind, IqType::Error);
    match response.into_result() {
        Err(XmppError::Stanza(error)) => assert_eq!(error.condition, "feature-not-implemented"),
        other => panic!("expected stanza error, got {other:?}"),
    }
}

/// Caller-chosen ids must be unique among outstanding requests
#[test]
fn test_duplicate_explicit_id() {
    let (session, transport) = bound_session(direct_config());
    let _first = session.submit_request(ping().with_id("dup"), None).unwrap();
    let sent_before = transport.sent().len();

    assert!(matches!(
        session.submit_request(ping().with_id("dup"), None),
        Err(XmppError::DuplicateRequestId(id)) if id == "dup"
    ));
    // The rejected request never reached the wire
    assert_eq!(transport.sent().len(), sent_before);
}

/// Generated ids stay unique under concurrent submission
#[test]
fn test_generated_ids_unique_across_threads() {
    let (session, _transport) = bound_session(direct_config());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || {
                (0..50)
                    .map(|_| session.submit_request(ping(), None).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let pending: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    let ids: HashSet<_> = pending.iter().map(|p| p.id().to_string()).collect();
    assert_eq!(ids.len(), 200);
    assert_eq!(session.pending_count(), 200);

    drop(pending);
    assert_eq!(session.pending_count(), 0);
}

/// Only the addressed entity can answer a request
#[test]
fn test_response_sender_checked() {
    let (session, transport) = bound_session(direct_config());
    let to: Jid = "romeo@example.net/orchard".parse().unwrap();
    let pending = session
        .submit_request(ping().with_to(to).with_id("v1"), None)
        .unwrap();

    transport.deliver(result_with_id("v1").with_attr("from", "mallory@evil.example/x"));
    assert!(session.is_pending("v1"));

    transport.deliver(result_with_id("v1").with_attr("from", "romeo@example.net/orchard"));
    assert!(pending.wait().is_ok());
}

/// The configured timeout applies when the caller passes none
#[test]
fn test_config_default_timeout() {
    let config = direct_config().with_request_timeout(Some(Duration::from_millis(30)));
    let (session, _transport) = bound_session(config);
    assert!(matches!(
        session.send_request(ping(), None),
        Err(XmppError::Timeout(_))
    ));
    assert_eq!(session.pending_count(), 0);
}

/// Dropping the last session handle releases blocked callers
#[test]
fn test_drop_releases_waiters() {
    let (session, transport) = bound_session(direct_config());
    let pending = session.submit_request(ping(), None).unwrap();

    let waiter = thread::spawn(move || pending.wait());
    drop(session);

    assert!(matches!(waiter.join().unwrap(), Err(XmppError::SessionClosed)));
    assert_eq!(transport.close_count(), 1);
}

/// A finished request's handle cannot withdraw a newer request reusing its id
#[test]
fn test_reused_id_survives_stale_handle() {
    let (session, transport) = bound_session(direct_config());

    let first = session.submit_request(ping().with_id("x"), None).unwrap();
    transport.deliver(result_with_id("x"));
    assert!(first.try_take().unwrap().is_ok());

    let second = session.submit_request(ping().with_id("x"), None).unwrap();
    assert!(session.is_pending("x"));
    drop(first);
    assert!(session.is_pending("x"));

    transport.deliver(result_with_id("x"));
    assert!(second.try_take().unwrap().is_ok());
    assert_eq!(session.pending_count(), 0);
}
