//! One-to-one messaging.

use crate::error::Result;
use crate::jid::Jid;
use crate::module::Module;
use crate::session::Session;
use crate::stanza::{Message, MessageType, Stanza};

/// Receives incoming chat and normal messages.
///
/// Called on the transport thread; must not block on correlated requests.
pub trait MessageHandler: Send + Sync {
    /// A message with a body arrived.
    fn on_message(&self, session: &Session, message: &Message);
}

impl<F> MessageHandler for F
where
    F: Fn(&Session, &Message) + Send + Sync,
{
    fn on_message(&self, session: &Session, message: &Message) {
        self(session, message);
    }
}

/// Hands chat and normal messages carrying a body to a [`MessageHandler`].
/// Other message types and body-less messages (chat states, receipts) are
/// left for later modules.
pub struct Messaging {
    handler: Box<dyn MessageHandler>,
}

impl Messaging {
    /// Module delivering to `handler`.
    pub fn new(handler: impl MessageHandler + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Send a chat message to `to`.
    pub fn send_chat(session: &Session, to: Jid, body: &str) -> Result<()> {
        let mut message = Message::chat(to, body);
        message.header.id = uuid::Uuid::new_v4().to_string();
        session.send(message)
    }
}

impl std::fmt::Debug for Messaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messaging").finish_non_exhaustive()
    }
}

impl Module for Messaging {
    fn name(&self) -> &str {
        "messaging"
    }

    fn consume(&self, session: &Session, stanza: &Stanza) -> bool {
        let Some(message) = stanza.as_message() else {
            return false;
        };
        if !matches!(message.kind, MessageType::Chat | MessageType::Normal) || message.body.is_none() {
            return false;
        }
        tracing::debug!(
            session = session.id(),
            from = ?message.header.from.as_ref().map(Jid::to_string),
            kind = message.kind.as_str(),
            "message received"
        );
        self.handler.on_message(session, message);
        true
    }
}
