//! XMPP ping (XEP-0199).

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::document::Element;
use crate::error::Result;
use crate::jid::Jid;
use crate::module::Module;
use crate::ns;
use crate::session::Session;
use crate::stanza::{Iq, IqType, Stanza};

/// Answers pings and sends them.
#[derive(Debug, Default)]
pub struct Ping;

impl Ping {
    /// Module instance.
    pub fn new() -> Self {
        Self
    }

    /// A ping request to `to`; `None` pings our own server.
    pub fn request(to: Option<Jid>) -> Iq {
        let iq = Iq::get(Element::new("ping", ns::PING));
        match to {
            Some(to) => iq.with_to(to),
            None => iq,
        }
    }

    /// Ping `to` and return the round-trip time.
    ///
    /// Blocks; never call it from a module or listener callback. An `error`
    /// answer proves the entity is reachable and counts as a pong. Routing
    /// failures (`remote-server-not-found` and similar) do not, and surface
    /// as [`crate::XmppError::Stanza`].
    pub fn ping(session: &Session, to: Option<Jid>, timeout: Option<Duration>) -> Result<Duration> {
        let started = Instant::now();
        let response = session.send_request(Self::request(to), timeout)?;
        let rtt = started.elapsed();
        if response.kind == IqType::Error {
            let unreachable = response.error.as_ref().is_some_and(|e| {
                matches!(
                    e.condition.as_str(),
                    "remote-server-not-found" | "remote-server-timeout" | "recipient-unavailable"
                )
            });
            if unreachable {
                response.into_result()?;
            }
        }
        tracing::debug!(session = session.id(), rtt_ms = rtt.as_millis() as u64, "pong");
        Ok(rtt)
    }
}

impl Module for Ping {
    fn name(&self) -> &str {
        "ping"
    }

    fn consume(&self, session: &Session, stanza: &Stanza) -> bool {
        let Some(iq) = stanza.as_iq() else {
            return false;
        };
        if iq.kind != IqType::Get || !iq.payload_is("ping", ns::PING) {
            return false;
        }
        if let Err(e) = session.send(iq.result_reply(None)) {
            tracing::warn!(session = session.id(), id = iq.id(), error = %e, "failed to answer ping");
        }
        true
    }

    fn disco_features(&self) -> BTreeSet<String> {
        BTreeSet::from([ns::PING.to_string()])
    }
}
