//! Service discovery, info half (XEP-0030).
//!
//! Incoming `disco#info` queries are answered with this client's identity
//! and the union of every registered module's features. [`Disco::query`]
//! asks another entity the same question.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::jid::Jid;
use crate::module::Module;
use crate::ns;
use crate::session::Session;
use crate::stanza::{ErrorType, Iq, IqType, Stanza, StanzaError};

/// An entity identity (`<identity category type name/>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Identity {
    /// E.g. `client`, `server`.
    pub category: String,
    /// E.g. `pc`, `im`.
    pub kind: String,
    /// Human-readable name.
    pub name: Option<String>,
}

impl Identity {
    /// Build an identity.
    pub fn new(category: &str, kind: &str, name: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            kind: kind.to_string(),
            name: name.map(str::to_string),
        }
    }

    fn to_element(&self) -> Element {
        Element::new("identity", ns::DISCO_INFO)
            .with_attr("category", self.category.as_str())
            .with_attr("type", self.kind.as_str())
            .with_opt_attr("name", self.name.as_deref())
    }
}

/// Parsed `disco#info` result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoInfo {
    /// Advertised identities.
    pub identities: Vec<Identity>,
    /// Advertised feature namespaces.
    pub features: BTreeSet<String>,
}

impl DiscoInfo {
    /// Whether the entity advertises `feature`.
    pub fn supports(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    fn parse(query: &Element) -> Self {
        let mut info = Self::default();
        for child in query.children().filter(|c| c.ns() == ns::DISCO_INFO) {
            match child.name() {
                "identity" => info.identities.push(Identity::new(
                    child.attr("category").unwrap_or_default(),
                    child.attr("type").unwrap_or_default(),
                    child.attr("name"),
                )),
                "feature" => {
                    if let Some(var) = child.attr("var") {
                        info.features.insert(var.to_string());
                    }
                },
                _ => {},
            }
        }
        info
    }
}

/// Answers `disco#info` queries.
#[derive(Debug)]
pub struct Disco {
    identity: Identity,
}

impl Default for Disco {
    fn default() -> Self {
        Self::new(Identity::new("client", "pc", Some("jabber-core")))
    }
}

impl Disco {
    /// Module advertising `identity`.
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    /// The identity reported to queries.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Ask `to` for its identities and features. Blocks.
    pub fn query(session: &Session, to: Jid, timeout: Option<Duration>) -> Result<DiscoInfo> {
        let request = Iq::get(Element::new("query", ns::DISCO_INFO)).with_to(to);
        let response = session.send_request(request, timeout)?.into_result()?;
        let query = response
            .payload
            .as_ref()
            .filter(|p| p.is("query", ns::DISCO_INFO))
            .ok_or_else(|| XmppError::InvalidStanza("disco#info result without query".to_string()))?;
        Ok(DiscoInfo::parse(query))
    }

    fn answer(&self, session: &Session, iq: &Iq) -> Iq {
        let query = iq.payload.as_ref();
        if query.and_then(|q| q.attr("node")).is_some() {
            return iq.error_reply(StanzaError::new(ErrorType::Cancel, "item-not-found"));
        }

        let result = session
            .disco_features()
            .into_iter()
            .fold(
                Element::new("query", ns::DISCO_INFO).with_child(self.identity.to_element()),
                |query, var| {
                    query.with_child(Element::new("feature", ns::DISCO_INFO).with_attr("var", var))
                },
            );
        iq.result_reply(Some(result))
    }
}

impl Module for Disco {
    fn name(&self) -> &str {
        "disco"
    }

    fn consume(&self, session: &Session, stanza: &Stanza) -> bool {
        let Some(iq) = stanza.as_iq() else {
            return false;
        };
        if !iq.payload_is("query", ns::DISCO_INFO) {
            return false;
        }
        if iq.kind != IqType::Get {
            let reply = iq.error_reply(StanzaError::bad_request());
            if let Err(e) = session.send(reply) {
                tracing::warn!(session = session.id(), error = %e, "failed to reject disco set");
            }
            return true;
        }

        if let Err(e) = session.send(self.answer(session, iq)) {
            tracing::warn!(session = session.id(), id = iq.id(), error = %e, "failed to answer disco#info");
        }
        true
    }

    fn disco_features(&self) -> BTreeSet<String> {
        BTreeSet::from([ns::DISCO_INFO.to_string()])
    }
}
