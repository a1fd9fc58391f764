//! Presence stanzas: availability and subscription management.

use std::str::FromStr;

use super::{child_text, StanzaError, StanzaHeader};
use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::ns;

/// Presence type. A missing `type` attribute means `Available`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresenceType {
    /// Online (no `type` attribute on the wire).
    #[default]
    Available,
    /// Offline.
    Unavailable,
    /// Request a subscription.
    Subscribe,
    /// Grant a subscription.
    Subscribed,
    /// Cancel our subscription.
    Unsubscribe,
    /// Revoke their subscription.
    Unsubscribed,
    /// Ask for current presence.
    Probe,
    /// Error bounced back to the sender.
    Error,
}

impl PresenceType {
    /// Wire form; `None` for `Available`.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Available => None,
            Self::Unavailable => Some("unavailable"),
            Self::Subscribe => Some("subscribe"),
            Self::Subscribed => Some("subscribed"),
            Self::Unsubscribe => Some("unsubscribe"),
            Self::Unsubscribed => Some("unsubscribed"),
            Self::Probe => Some("probe"),
            Self::Error => Some("error"),
        }
    }
}

impl FromStr for PresenceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unavailable" => Ok(Self::Unavailable),
            "subscribe" => Ok(Self::Subscribe),
            "subscribed" => Ok(Self::Subscribed),
            "unsubscribe" => Ok(Self::Unsubscribe),
            "unsubscribed" => Ok(Self::Unsubscribed),
            "probe" => Ok(Self::Probe),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown presence type: {s}")),
        }
    }
}

/// `<show/>` availability sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Show {
    /// Temporarily away.
    Away,
    /// Free for chat.
    Chat,
    /// Do not disturb.
    Dnd,
    /// Extended away.
    Xa,
}

impl Show {
    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Away => "away",
            Self::Chat => "chat",
            Self::Dnd => "dnd",
            Self::Xa => "xa",
        }
    }
}

impl FromStr for Show {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "away" => Ok(Self::Away),
            "chat" => Ok(Self::Chat),
            "dnd" => Ok(Self::Dnd),
            "xa" => Ok(Self::Xa),
            _ => Err(format!("Unknown show value: {s}")),
        }
    }
}

/// Availability stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presence {
    /// Common attributes.
    pub header: StanzaHeader,
    /// Presence type.
    pub kind: PresenceType,
    /// Availability sub-state.
    pub show: Option<Show>,
    /// Free-form status text.
    pub status: Option<String>,
    /// Resource priority, -128..=127.
    pub priority: i8,
    /// Extension children, in document order.
    pub payload: Vec<Element>,
    /// Error details for `error` presence.
    pub error: Option<StanzaError>,
}

impl Presence {
    /// Broadcast availability with no addressee.
    pub fn available() -> Self {
        Self::default()
    }

    /// Broadcast unavailability.
    pub fn unavailable() -> Self {
        Self {
            kind: PresenceType::Unavailable,
            ..Self::default()
        }
    }

    /// Builder: set `<show/>`.
    pub fn with_show(mut self, show: Show) -> Self {
        self.show = Some(show);
        self
    }

    /// Builder: set `<status/>`.
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }
}

impl TryFrom<&Element> for Presence {
    type Error = XmppError;

    fn try_from(el: &Element) -> Result<Self> {
        if !el.is("presence", ns::CLIENT) {
            return Err(XmppError::InvalidStanza(format!(
                "<{}/> is not a presence",
                el.name()
            )));
        }
        let kind = match el.attr("type") {
            Some(t) => t.parse().map_err(XmppError::InvalidStanza)?,
            None => PresenceType::Available,
        };
        let show = child_text(el, "show")
            .map(|s| s.trim().parse())
            .transpose()
            .map_err(XmppError::InvalidStanza)?;
        let priority = child_text(el, "priority")
            .map(|p| p.trim().parse::<i8>())
            .transpose()
            .map_err(|e| XmppError::InvalidStanza(format!("invalid priority: {e}")))?
            .unwrap_or(0);
        let payload = el
            .children()
            .filter(|c| {
                !(c.ns() == ns::CLIENT
                    && matches!(c.name(), "show" | "status" | "priority" | "error"))
            })
            .cloned()
            .collect();

        Ok(Self {
            header: StanzaHeader::parse(el)?,
            kind,
            show,
            status: child_text(el, "status"),
            priority,
            payload,
            error: if kind == PresenceType::Error {
                StanzaError::from_stanza(el)
            } else {
                None
            },
        })
    }
}

impl From<&Presence> for Element {
    fn from(pres: &Presence) -> Self {
        let mut el = pres
            .header
            .apply(Element::new("presence", ns::CLIENT))
            .with_opt_attr("type", pres.kind.as_str());
        if let Some(show) = pres.show {
            el.append_child(Element::new("show", ns::CLIENT).with_text(show.as_str()));
        }
        if let Some(status) = &pres.status {
            el.append_child(Element::new("status", ns::CLIENT).with_text(status.as_str()));
        }
        if pres.priority != 0 {
            el.append_child(
                Element::new("priority", ns::CLIENT).with_text(pres.priority.to_string()),
            );
        }
        for child in &pres.payload {
            el.append_child(child.clone());
        }
        if let Some(error) = &pres.error {
            el.append_child(error.into());
        }
        el
    }
}
