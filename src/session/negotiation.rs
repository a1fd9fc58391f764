//! Stream feature negotiation.
//!
//! Drives the client side of RFC6120 negotiation one document at a time:
//!
//! ```text
//!  features ──► <starttls/> ──► proceed ──► restart ─┐
//!     ▲                                              │
//!     ├──────────────────────────────────────────────┘
//!  features ──► <auth/> ──► (challenge/response)* ──► success ──► restart ─┐
//!     ▲                                                                    │
//!     ├────────────────────────────────────────────────────────────────────┘
//!  features ──► bind iq ──► result ──► [session iq ──► result] ──► bound
//! ```
//!
//! The negotiator never touches the transport. It returns [`Action`]s that
//! the session executes after releasing its lock, so transport callbacks
//! and listener notifications never run under it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::config::{Credentials, SessionConfig, TlsPolicy};
use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::features::StreamFeatures;
use crate::jid::Jid;
use crate::ns;
use crate::sasl::{self, SaslMechanism};
use crate::stanza::{Iq, IqType};

/// Side effect requested by the negotiator.
pub(super) enum Action {
    /// Report advertised features to listeners.
    Features(StreamFeatures),
    /// Write a document.
    Send(Element),
    /// Upgrade the connection to TLS.
    StartTls,
    /// Send a fresh stream header.
    Restart,
    /// Negotiation finished with this identity.
    Bound(Jid),
}

enum Phase {
    AwaitFeatures,
    AwaitTls,
    AwaitSasl(Box<dyn SaslMechanism>),
    AwaitBind { id: String },
    AwaitSession { id: String, jid: Jid },
    Done,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitFeatures => "features",
            Self::AwaitTls => "starttls",
            Self::AwaitSasl(_) => "sasl",
            Self::AwaitBind { .. } => "bind",
            Self::AwaitSession { .. } => "session",
            Self::Done => "done",
        }
    }
}

pub(super) struct Negotiator {
    tls: TlsPolicy,
    credentials: Option<Credentials>,
    resource: Option<String>,
    phase: Phase,
    secured: bool,
    authenticated: bool,
    session_required: bool,
}

impl Negotiator {
    pub(super) fn new(config: &SessionConfig) -> Self {
        Self {
            tls: config.tls,
            credentials: config.credentials.clone(),
            resource: config.resource.clone(),
            phase: Phase::AwaitFeatures,
            secured: false,
            authenticated: false,
            session_required: false,
        }
    }

    /// Current step, for logging.
    pub(super) fn phase(&self) -> &'static str {
        self.phase.name()
    }

    /// Feed one incoming document. Any error is fatal to the stream.
    pub(super) fn handle(&mut self, el: &Element) -> Result<Vec<Action>> {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::AwaitFeatures => self.on_features(el),
            Phase::AwaitTls => self.on_tls(el),
            Phase::AwaitSasl(mechanism) => self.on_sasl(mechanism, el),
            Phase::AwaitBind { id } => self.on_bind(&id, el),
            Phase::AwaitSession { id, jid } => self.on_session(&id, jid, el),
            Phase::Done => Err(unexpected(el, "no document")),
        }
    }

    fn on_features(&mut self, el: &Element) -> Result<Vec<Action>> {
        if !StreamFeatures::matches(el) {
            return Err(unexpected(el, "stream features"));
        }
        let features = StreamFeatures::parse(el)?;
        let next = self.advance(&features)?;
        Ok(vec![Action::Features(features), next])
    }

    fn advance(&mut self, features: &StreamFeatures) -> Result<Action> {
        if !self.secured {
            match (features.starttls, self.tls) {
                (Some(_), TlsPolicy::Optional | TlsPolicy::Required) => {
                    tracing::debug!("requesting STARTTLS");
                    self.phase = Phase::AwaitTls;
                    return Ok(Action::Send(Element::new("starttls", ns::TLS)));
                },
                (None, TlsPolicy::Required) => {
                    return Err(XmppError::Protocol(
                        "TLS is required but the server does not offer STARTTLS".to_string(),
                    ));
                },
                (Some(true), TlsPolicy::Disabled) => {
                    return Err(XmppError::Protocol(
                        "server requires STARTTLS but TLS is disabled".to_string(),
                    ));
                },
                _ => {},
            }
        }

        if !self.authenticated && !features.mechanisms.is_empty() {
            let mut mechanism =
                sasl::select_mechanism(&features.mechanisms, self.credentials.as_ref())
                    .ok_or_else(|| {
                        XmppError::Auth(format!(
                            "no usable SASL mechanism among {:?}",
                            features.mechanisms
                        ))
                    })?;
            let mut auth = Element::new("auth", ns::SASL).with_attr("mechanism", mechanism.name());
            if let Some(initial) = mechanism.initial_response()? {
                auth.append_text(encode(&initial));
            }
            tracing::debug!(mechanism = mechanism.name(), "starting SASL");
            self.phase = Phase::AwaitSasl(mechanism);
            return Ok(Action::Send(auth));
        }

        if features.bind {
            self.session_required = features.session_required;
            let mut bind = Element::new("bind", ns::BIND);
            if let Some(resource) = &self.resource {
                bind.append_child(Element::new("resource", ns::BIND).with_text(resource.clone()));
            }
            let id = uuid::Uuid::new_v4().to_string();
            let iq = Iq::set(bind).with_id(&id);
            tracing::debug!(resource = ?self.resource, "binding resource");
            self.phase = Phase::AwaitBind { id };
            return Ok(Action::Send(Element::from(&iq)));
        }

        Err(XmppError::Protocol(
            "stream features offer neither authentication nor resource binding".to_string(),
        ))
    }

    fn on_tls(&mut self, el: &Element) -> Result<Vec<Action>> {
        if el.is("proceed", ns::TLS) {
            self.secured = true;
            self.phase = Phase::AwaitFeatures;
            return Ok(vec![Action::StartTls, Action::Restart]);
        }
        if el.is("failure", ns::TLS) {
            return Err(XmppError::Protocol("server aborted STARTTLS".to_string()));
        }
        Err(unexpected(el, "STARTTLS response"))
    }

    fn on_sasl(&mut self, mut mechanism: Box<dyn SaslMechanism>, el: &Element) -> Result<Vec<Action>> {
        if el.ns() != ns::SASL {
            return Err(unexpected(el, "SASL response"));
        }
        match el.name() {
            "challenge" => {
                let challenge = decode(el)?;
                let answer = mechanism.respond(&challenge)?;
                let response = Element::new("response", ns::SASL).with_text(encode(&answer));
                self.phase = Phase::AwaitSasl(mechanism);
                Ok(vec![Action::Send(response)])
            },
            "success" => {
                tracing::debug!(mechanism = mechanism.name(), "authenticated");
                self.authenticated = true;
                self.phase = Phase::AwaitFeatures;
                Ok(vec![Action::Restart])
            },
            "failure" => {
                let condition = el
                    .children()
                    .find(|c| c.name() != "text")
                    .map_or("not-authorized", Element::name);
                let text = el.get_child("text", ns::SASL).map(Element::text);
                Err(XmppError::Auth(match text {
                    Some(text) => format!("{} rejected: {condition} ({text})", mechanism.name()),
                    None => format!("{} rejected: {condition}", mechanism.name()),
                }))
            },
            _ => Err(unexpected(el, "SASL response")),
        }
    }

    fn on_bind(&mut self, id: &str, el: &Element) -> Result<Vec<Action>> {
        let iq = expect_response(id, el, "bind result")?;
        let jid: Jid = iq
            .payload
            .as_ref()
            .and_then(|p| p.get_child("jid", ns::BIND))
            .map(Element::text)
            .ok_or_else(|| XmppError::Protocol("bind result carries no jid".to_string()))?
            .trim()
            .parse()?;

        if self.session_required {
            let id = uuid::Uuid::new_v4().to_string();
            let iq = Iq::set(Element::new("session", ns::SESSION)).with_id(&id);
            tracing::debug!(%jid, "establishing legacy session");
            self.phase = Phase::AwaitSession { id, jid };
            return Ok(vec![Action::Send(Element::from(&iq))]);
        }
        Ok(vec![Action::Bound(jid)])
    }

    fn on_session(&mut self, id: &str, jid: Jid, el: &Element) -> Result<Vec<Action>> {
        expect_response(id, el, "session result")?;
        Ok(vec![Action::Bound(jid)])
    }
}

/// The `result` IQ answering request `id`; an `error` answer is fatal.
fn expect_response(id: &str, el: &Element, what: &str) -> Result<Iq> {
    if !el.is("iq", ns::CLIENT) || el.attr("id") != Some(id) {
        return Err(unexpected(el, what));
    }
    let iq = Iq::try_from(el)?;
    match iq.kind {
        IqType::Result => Ok(iq),
        IqType::Error => Err(XmppError::Protocol(format!(
            "{what} failed: {}",
            iq.error
                .as_ref()
                .map_or_else(|| "no error condition".to_string(), ToString::to_string)
        ))),
        _ => Err(unexpected(el, what)),
    }
}

fn unexpected(el: &Element, expected: &str) -> XmppError {
    XmppError::Protocol(format!(
        "expected {expected}, got <{} xmlns='{}'/>",
        el.name(),
        el.ns()
    ))
}

/// SASL payload encoding; an empty payload is sent as `=`.
fn encode(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        "=".to_string()
    } else {
        BASE64.encode(bytes)
    }
}

fn decode(el: &Element) -> Result<Vec<u8>> {
    let text = el.text();
    let text = text.trim();
    if text.is_empty() || text == "=" {
        return Ok(Vec::new());
    }
    Ok(BASE64.decode(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(children: Vec<Element>) -> Element {
        children
            .into_iter()
            .fold(Element::new("features", ns::STREAM), Element::with_child)
    }

    fn starttls() -> Element {
        Element::new("starttls", ns::TLS)
    }

    fn mechanisms(names: &[&str]) -> Element {
        names.iter().fold(Element::new("mechanisms", ns::SASL), |el, name| {
            el.with_child(Element::new("mechanism", ns::SASL).with_text(*name))
        })
    }

    fn bind() -> Element {
        Element::new("bind", ns::BIND)
    }

    fn sent(actions: &[Action]) -> Vec<&Element> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(el) => Some(el),
                _ => None,
            })
            .collect()
    }

    fn bind_result(request: &Element, jid: &str) -> Element {
        Element::new("iq", ns::CLIENT)
            .with_attr("type", "result")
            .with_attr("id", request.attr("id").unwrap_or_default())
            .with_child(bind().with_child(Element::new("jid", ns::BIND).with_text(jid)))
    }

    #[test]
    fn test_full_negotiation() {
        let config = SessionConfig::new("example.com")
            .with_credentials("juliet", "r0m30")
            .with_resource("balcony");
        let mut neg = Negotiator::new(&config);

        let actions = neg.handle(&features(vec![starttls()])).unwrap();
        assert!(matches!(actions[0], Action::Features(_)));
        assert!(sent(&actions)[0].is("starttls", ns::TLS));
        assert_eq!(neg.phase(), "starttls");

        let actions = neg.handle(&Element::new("proceed", ns::TLS)).unwrap();
        assert!(matches!(actions.as_slice(), [Action::StartTls, Action::Restart]));

        let actions = neg.handle(&features(vec![mechanisms(&["SCRAM-SHA-1", "PLAIN"])])).unwrap();
        let auth = sent(&actions)[0];
        assert_eq!(auth.attr("mechanism"), Some("PLAIN"));
        assert_eq!(BASE64.decode(auth.text()).unwrap(), b"\0juliet\0r0m30".to_vec());

        let actions = neg.handle(&Element::new("success", ns::SASL)).unwrap();
        assert!(matches!(actions.as_slice(), [Action::Restart]));

        let actions = neg.handle(&features(vec![bind()])).unwrap();
        let request = sent(&actions)[0].clone();
        let resource = request
            .get_child("bind", ns::BIND)
            .and_then(|b| b.get_child("resource", ns::BIND))
            .map(Element::text);
        assert_eq!(resource.as_deref(), Some("balcony"));

        let actions = neg
            .handle(&bind_result(&request, "juliet@example.com/balcony"))
            .unwrap();
        match actions.as_slice() {
            [Action::Bound(jid)] => assert_eq!(jid.to_string(), "juliet@example.com/balcony"),
            _ => panic!("expected bound"),
        }
    }

    #[test]
    fn test_required_tls_not_offered() {
        let mut neg = Negotiator::new(&SessionConfig::new("example.com"));
        let err = neg.handle(&features(vec![bind()])).err().unwrap();
        assert!(matches!(err, XmppError::Protocol(_)));
    }

    #[test]
    fn test_optional_tls_skips_to_bind() {
        let config = SessionConfig::new("example.com").with_tls(TlsPolicy::Optional);
        let mut neg = Negotiator::new(&config);
        let actions = neg.handle(&features(vec![bind()])).unwrap();
        assert!(sent(&actions)[0].is("iq", ns::CLIENT));
        assert_eq!(neg.phase(), "bind");
    }

    #[test]
    fn test_sasl_failure_is_auth_error() {
        let config = SessionConfig::new("example.com")
            .with_tls(TlsPolicy::Disabled)
            .with_credentials("juliet", "wrong");
        let mut neg = Negotiator::new(&config);
        neg.handle(&features(vec![mechanisms(&["PLAIN"])])).unwrap();

        let failure = Element::new("failure", ns::SASL)
            .with_child(Element::new("not-authorized", ns::SASL));
        let err = neg.handle(&failure).err().unwrap();
        assert!(matches!(err, XmppError::Auth(msg) if msg.contains("not-authorized")));
    }

    #[test]
    fn test_no_usable_mechanism() {
        let config = SessionConfig::new("example.com").with_tls(TlsPolicy::Disabled);
        let mut neg = Negotiator::new(&config);
        let err = neg
            .handle(&features(vec![mechanisms(&["PLAIN"])]))
            .err()
            .unwrap();
        assert!(matches!(err, XmppError::Auth(_)));
    }

    #[test]
    fn test_anonymous_sends_empty_auth() {
        let config = SessionConfig::new("example.com").with_tls(TlsPolicy::Disabled);
        let mut neg = Negotiator::new(&config);
        let actions = neg.handle(&features(vec![mechanisms(&["ANONYMOUS"])])).unwrap();
        let auth = sent(&actions)[0];
        assert_eq!(auth.attr("mechanism"), Some("ANONYMOUS"));
        assert!(auth.text().is_empty());
    }

    #[test]
    fn test_legacy_session_step() {
        let config = SessionConfig::new("example.com").with_tls(TlsPolicy::Disabled);
        let mut neg = Negotiator::new(&config);
        let actions = neg
            .handle(&features(vec![bind(), Element::new("session", ns::SESSION)]))
            .unwrap();
        let request = sent(&actions)[0].clone();

        let actions = neg.handle(&bind_result(&request, "anon@example.com/x")).unwrap();
        let session_iq = sent(&actions)[0].clone();
        assert!(session_iq.has_child("session", ns::SESSION));

        let result = Element::new("iq", ns::CLIENT)
            .with_attr("type", "result")
            .with_attr("id", session_iq.attr("id").unwrap_or_default());
        let actions = neg.handle(&result).unwrap();
        assert!(matches!(actions.as_slice(), [Action::Bound(_)]));
    }

    #[test]
    fn test_bind_error_is_fatal() {
        let config = SessionConfig::new("example.com").with_tls(TlsPolicy::Disabled);
        let mut neg = Negotiator::new(&config);
        let actions = neg.handle(&features(vec![bind()])).unwrap();
        let request = sent(&actions)[0].clone();

        let error = Element::new("iq", ns::CLIENT)
            .with_attr("type", "error")
            .with_attr("id", request.attr("id").unwrap_or_default())
            .with_child(
                Element::new("error", ns::CLIENT)
                    .with_attr("type", "cancel")
                    .with_child(Element::new("conflict", ns::STANZAS)),
            );
        assert!(matches!(neg.handle(&error), Err(XmppError::Protocol(_))));
    }

    #[test]
    fn test_unexpected_document() {
        let mut neg = Negotiator::new(&SessionConfig::new("example.com"));
        let message = Element::new("message", ns::CLIENT);
        assert!(matches!(neg.handle(&message), Err(XmppError::Protocol(_))));
    }
}
