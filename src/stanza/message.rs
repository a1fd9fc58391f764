//! Message stanzas: one-way notifications.

use std::str::FromStr;

use super::{child_text, StanzaError, StanzaHeader};
use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::jid::Jid;
use crate::ns;

/// Message type. A missing `type` attribute means `Normal`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageType {
    /// One-to-one conversation.
    Chat,
    /// Error bounced back to the sender.
    Error,
    /// Multi-user chat.
    Groupchat,
    /// Alert or notification that expects no reply.
    Headline,
    /// Standalone message.
    #[default]
    Normal,
}

impl MessageType {
    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Error => "error",
            Self::Groupchat => "groupchat",
            Self::Headline => "headline",
            Self::Normal => "normal",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "error" => Ok(Self::Error),
            "groupchat" => Ok(Self::Groupchat),
            "headline" => Ok(Self::Headline),
            "normal" => Ok(Self::Normal),
            _ => Err(format!("Unknown message type: {s}")),
        }
    }
}

/// Notification stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Common attributes.
    pub header: StanzaHeader,
    /// Message type.
    pub kind: MessageType,
    /// `<body/>` text.
    pub body: Option<String>,
    /// `<subject/>` text.
    pub subject: Option<String>,
    /// `<thread/>` identifier.
    pub thread: Option<String>,
    /// Extension children, in document order.
    pub payload: Vec<Element>,
    /// Error details for `error` messages.
    pub error: Option<StanzaError>,
}

impl Message {
    /// A chat message to `to` with a body.
    pub fn chat(to: Jid, body: &str) -> Self {
        Self {
            header: StanzaHeader {
                to: Some(to),
                ..StanzaHeader::default()
            },
            kind: MessageType::Chat,
            body: Some(body.to_string()),
            ..Self::default()
        }
    }

    /// Builder: attach an extension payload.
    pub fn with_payload(mut self, payload: Element) -> Self {
        self.payload.push(payload);
        self
    }
}

impl TryFrom<&Element> for Message {
    type Error = XmppError;

    fn try_from(el: &Element) -> Result<Self> {
        if !el.is("message", ns::CLIENT) {
            return Err(XmppError::InvalidStanza(format!(
                "<{}/> is not a message",
                el.name()
            )));
        }
        let kind = match el.attr("type") {
            Some(t) => t.parse().map_err(XmppError::InvalidStanza)?,
            None => MessageType::Normal,
        };
        let payload = el
            .children()
            .filter(|c| {
                !(c.ns() == ns::CLIENT && matches!(c.name(), "body" | "subject" | "thread" | "error"))
            })
            .cloned()
            .collect();

        Ok(Self {
            header: StanzaHeader::parse(el)?,
            kind,
            body: child_text(el, "body"),
            subject: child_text(el, "subject"),
            thread: child_text(el, "thread"),
            payload,
            error: if kind == MessageType::Error {
                StanzaError::from_stanza(el)
            } else {
                None
            },
        })
    }
}

impl From<&Message> for Element {
    fn from(msg: &Message) -> Self {
        let mut el = msg.header.apply(Element::new("message", ns::CLIENT));
        if msg.kind != MessageType::Normal {
            el.set_attr("type", msg.kind.as_str());
        }
        for (name, text) in [
            ("subject", &msg.subject),
            ("body", &msg.body),
            ("thread", &msg.thread),
        ] {
            if let Some(text) = text {
                el.append_child(Element::new(name, ns::CLIENT).with_text(text.as_str()));
            }
        }
        for child in &msg.payload {
            el.append_child(child.clone());
        }
        if let Some(error) = &msg.error {
            el.append_child(error.into());
        }
        el
    }
}
