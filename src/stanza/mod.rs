//! Typed stanza views over structured documents.
//!
//! Three stanza kinds share a common header (`to`, `from`, `id`, `xml:lang`):
//!
//! | Kind       | Element      | Types                                        |
//! |------------|--------------|----------------------------------------------|
//! | [`Iq`]       | `<iq/>`       | get, set (requests); result, error (responses) |
//! | [`Message`]  | `<message/>`  | chat, error, groupchat, headline, normal    |
//! | [`Presence`] | `<presence/>` | available, unavailable, subscription, probe, error |
//!
//! Each view converts from an [`Element`] with `TryFrom<&Element>` and back
//! with `From<&View> for Element`. Unknown child elements are preserved as
//! payload so extensions can interpret them.

mod error;
mod iq;
mod message;
mod presence;

pub use error::{ErrorType, StanzaError};
pub use iq::{Iq, IqType};
pub use message::{Message, MessageType};
pub use presence::{Presence, PresenceType, Show};

use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::jid::Jid;
use crate::ns;

/// Attributes common to every stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StanzaHeader {
    /// Recipient.
    pub to: Option<Jid>,
    /// Sender.
    pub from: Option<Jid>,
    /// Stanza id. Empty means "not set"; requests get one generated on send.
    pub id: String,
    /// `xml:lang`.
    pub lang: Option<String>,
}

impl StanzaHeader {
    pub(crate) fn parse(el: &Element) -> Result<Self> {
        let jid_attr = |key: &str| -> Result<Option<Jid>> {
            el.attr(key)
                .map(|value| value.parse::<Jid>().map_err(XmppError::from))
                .transpose()
        };

        Ok(Self {
            to: jid_attr("to")?,
            from: jid_attr("from")?,
            id: el.attr("id").unwrap_or_default().to_string(),
            lang: el.attr("xml:lang").map(str::to_string),
        })
    }

    pub(crate) fn apply(&self, el: Element) -> Element {
        el.with_opt_attr("to", self.to.as_ref().map(Jid::to_string))
            .with_opt_attr("from", self.from.as_ref().map(Jid::to_string))
            .with_opt_attr("id", (!self.id.is_empty()).then(|| self.id.clone()))
            .with_opt_attr("xml:lang", self.lang.clone())
    }

    /// Header for a reply: addresses swapped, id kept.
    pub(crate) fn reply(&self) -> Self {
        Self {
            to: self.from.clone(),
            from: self.to.clone(),
            id: self.id.clone(),
            lang: None,
        }
    }
}

/// Any of the three stanza kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stanza {
    /// Request/response.
    Iq(Iq),
    /// Notification.
    Message(Message),
    /// Availability.
    Presence(Presence),
}

impl Stanza {
    /// Whether the element is one of the three client stanzas.
    pub fn is_stanza(el: &Element) -> bool {
        el.ns() == ns::CLIENT && matches!(el.name(), "iq" | "message" | "presence")
    }

    /// Common header.
    pub fn header(&self) -> &StanzaHeader {
        match self {
            Self::Iq(iq) => &iq.header,
            Self::Message(msg) => &msg.header,
            Self::Presence(pres) => &pres.header,
        }
    }

    /// Mutable common header.
    pub fn header_mut(&mut self) -> &mut StanzaHeader {
        match self {
            Self::Iq(iq) => &mut iq.header,
            Self::Message(msg) => &mut msg.header,
            Self::Presence(pres) => &mut pres.header,
        }
    }

    /// Stanza id (may be empty).
    pub fn id(&self) -> &str {
        &self.header().id
    }

    /// Sender.
    pub fn from(&self) -> Option<&Jid> {
        self.header().from.as_ref()
    }

    /// Recipient.
    pub fn to(&self) -> Option<&Jid> {
        self.header().to.as_ref()
    }

    /// Element name, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Iq(_) => "iq",
            Self::Message(_) => "message",
            Self::Presence(_) => "presence",
        }
    }

    /// The IQ view, if this is an IQ.
    pub fn as_iq(&self) -> Option<&Iq> {
        match self {
            Self::Iq(iq) => Some(iq),
            _ => None,
        }
    }

    /// The message view, if this is a message.
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// The presence view, if this is a presence.
    pub fn as_presence(&self) -> Option<&Presence> {
        match self {
            Self::Presence(pres) => Some(pres),
            _ => None,
        }
    }
}

impl TryFrom<&Element> for Stanza {
    type Error = XmppError;

    fn try_from(el: &Element) -> Result<Self> {
        if el.ns() != ns::CLIENT {
            return Err(XmppError::InvalidStanza(format!(
                "unexpected namespace {} for <{}/>",
                el.ns(),
                el.name()
            )));
        }
        match el.name() {
            "iq" => Ok(Self::Iq(Iq::try_from(el)?)),
            "message" => Ok(Self::Message(Message::try_from(el)?)),
            "presence" => Ok(Self::Presence(Presence::try_from(el)?)),
            other => Err(XmppError::InvalidStanza(format!("<{other}/> is not a stanza"))),
        }
    }
}

impl From<&Stanza> for Element {
    fn from(stanza: &Stanza) -> Self {
        match stanza {
            Stanza::Iq(iq) => iq.into(),
            Stanza::Message(msg) => msg.into(),
            Stanza::Presence(pres) => pres.into(),
        }
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Self {
        Self::Iq(iq)
    }
}

impl From<Message> for Stanza {
    fn from(msg: Message) -> Self {
        Self::Message(msg)
    }
}

impl From<Presence> for Stanza {
    fn from(pres: Presence) -> Self {
        Self::Presence(pres)
    }
}

/// First child of `el` named `name` in the client namespace, as text.
pub(crate) fn child_text(el: &Element, name: &str) -> Option<String> {
    el.get_child(name, ns::CLIENT).map(Element::text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_qualified_name() {
        let iq = Element::new("iq", ns::CLIENT)
            .with_attr("type", "get")
            .with_attr("id", "q1")
            .with_child(Element::new("ping", ns::PING));
        assert!(matches!(Stanza::try_from(&iq), Ok(Stanza::Iq(_))));

        let wrong_ns = Element::new("iq", "jabber:server").with_attr("type", "get");
        assert!(!Stanza::is_stanza(&wrong_ns));
        assert!(Stanza::try_from(&wrong_ns).is_err());

        let features = Element::new("features", ns::STREAM);
        assert!(Stanza::try_from(&features).is_err());
    }

    #[test]
    fn test_header_round_trip_through_element() {
        let el = Element::new("message", ns::CLIENT)
            .with_attr("to", "Juliet@Example.com/balcony")
            .with_attr("from", "romeo@example.net")
            .with_attr("id", "m1")
            .with_attr("xml:lang", "en");
        let stanza = Stanza::try_from(&el).unwrap();
        assert_eq!(stanza.id(), "m1");
        assert_eq!(stanza.to().unwrap().to_string(), "juliet@example.com/balcony");
        assert_eq!(stanza.header().lang.as_deref(), Some("en"));

        let back = Element::from(&stanza);
        assert_eq!(back.attr("to"), Some("juliet@example.com/balcony"));
        assert_eq!(back.attr("xml:lang"), Some("en"));
    }

    #[test]
    fn test_malformed_jid_rejected() {
        let el = Element::new("presence", ns::CLIENT).with_attr("from", "@nowhere");
        assert!(matches!(
            Stanza::try_from(&el),
            Err(XmppError::InvalidJid(_))
        ));
    }
}
