//! Server-advertised stream features.
//!
//! The server sends `<stream:features/>` after every stream (re)start. A
//! typical negotiation sees it three times: STARTTLS offered, then SASL
//! mechanisms over TLS, then resource binding once authenticated.

use std::collections::BTreeSet;

use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::ns;

/// Parsed `<stream:features/>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFeatures {
    /// STARTTLS offered; `Some(true)` when the server marks it required.
    pub starttls: Option<bool>,
    /// SASL mechanisms in server order.
    pub mechanisms: Vec<String>,
    /// Resource binding offered.
    pub bind: bool,
    /// Legacy session establishment offered and not marked optional.
    pub session_required: bool,
    /// Namespaces of every advertised feature, including unknown ones.
    pub namespaces: BTreeSet<String>,
}

impl StreamFeatures {
    /// Whether the element is a features advertisement.
    pub fn matches(el: &Element) -> bool {
        el.is("features", ns::STREAM)
    }

    /// Parse a features advertisement.
    pub fn parse(el: &Element) -> Result<Self> {
        if !Self::matches(el) {
            return Err(XmppError::Protocol(format!(
                "expected stream features, got <{}/>",
                el.name()
            )));
        }

        let mut features = Self::default();
        for child in el.children() {
            features.namespaces.insert(child.ns().to_string());
            match (child.name(), child.ns()) {
                ("starttls", ns::TLS) => {
                    features.starttls = Some(child.has_child("required", ns::TLS));
                },
                ("mechanisms", ns::SASL) => {
                    features.mechanisms = child
                        .children()
                        .filter(|m| m.is("mechanism", ns::SASL))
                        .map(|m| m.text().trim().to_string())
                        .filter(|m| !m.is_empty())
                        .collect();
                },
                ("bind", ns::BIND) => features.bind = true,
                ("session", ns::SESSION) => {
                    features.session_required = !child.has_child("optional", ns::SESSION);
                },
                _ => {},
            }
        }
        Ok(features)
    }

    /// Whether the server offers a SASL mechanism by name.
    pub fn offers_mechanism(&self, name: &str) -> bool {
        self.mechanisms.iter().any(|m| m.eq_ignore_ascii_case(name))
    }

    /// Whether a feature with this namespace was advertised.
    pub fn has(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }
}
