//! XML namespaces used by the session core.

/// Client stanzas.
pub const CLIENT: &str = "jabber:client";
/// Stream framing (`<stream:features/>`, `<stream:error/>`).
pub const STREAM: &str = "http://etherx.jabber.org/streams";
/// STARTTLS negotiation.
pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
/// SASL negotiation.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
/// Resource binding.
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
/// Legacy session establishment (RFC3921).
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
/// Stanza error conditions.
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
/// Stream error conditions.
pub const STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
/// Service discovery, info queries (XEP-0030).
pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";
/// XMPP ping (XEP-0199).
pub const PING: &str = "urn:xmpp:ping";
