//! SASL mechanisms used during stream negotiation.
//!
//! Mechanisms produce raw bytes; the session base64-encodes them into
//! `<auth/>` and `<response/>` elements and decodes `<challenge/>` payloads.

use crate::config::Credentials;
use crate::error::{Result, XmppError};

/// A client-side SASL mechanism.
pub trait SaslMechanism: Send {
    /// IANA-registered mechanism name.
    fn name(&self) -> &'static str;

    /// Initial response sent with `<auth/>`; `None` sends an empty element.
    fn initial_response(&mut self) -> Result<Option<Vec<u8>>>;

    /// Answer a server challenge.
    fn respond(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let _ = challenge;
        Err(XmppError::Auth(format!(
            "{} does not expect challenges",
            self.name()
        )))
    }
}

/// RFC4616 PLAIN: `\0username\0password`.
#[derive(Debug)]
pub struct Plain {
    credentials: Credentials,
}

impl Plain {
    /// Mechanism for the given credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl SaslMechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn initial_response(&mut self) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::with_capacity(
            self.credentials.username.len() + self.credentials.password.len() + 2,
        );
        out.push(0);
        out.extend_from_slice(self.credentials.username.as_bytes());
        out.push(0);
        out.extend_from_slice(self.credentials.password.as_bytes());
        Ok(Some(out))
    }
}

/// RFC4505 ANONYMOUS.
#[derive(Debug, Default)]
pub struct Anonymous;

impl SaslMechanism for Anonymous {
    fn name(&self) -> &'static str {
        "ANONYMOUS"
    }

    fn initial_response(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Pick the first mechanism we support that the server offers.
///
/// With credentials PLAIN is the only candidate; without them ANONYMOUS is.
pub fn select_mechanism(
    offered: &[String],
    credentials: Option<&Credentials>,
) -> Option<Box<dyn SaslMechanism>> {
    let offers = |name: &str| offered.iter().any(|m| m.eq_ignore_ascii_case(name));
    match credentials {
        Some(creds) if offers("PLAIN") => Some(Box::new(Plain::new(creds.clone()))),
        None if offers("ANONYMOUS") => Some(Box::new(Anonymous)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_initial_response() {
        let mut plain = Plain::new(Credentials::new("juliet", "r0m30"));
        assert_eq!(
            plain.initial_response().unwrap().unwrap(),
            b"\0juliet\0r0m30".to_vec()
        );
        assert!(plain.respond(b"unexpected").is_err());
    }

    #[test]
    fn test_select_mechanism() {
        let offered = vec!["SCRAM-SHA-1".to_string(), "plain".to_string()];
        let creds = Credentials::new("juliet", "pw");
        assert_eq!(
            select_mechanism(&offered, Some(&creds)).unwrap().name(),
            "PLAIN"
        );
        assert!(select_mechanism(&offered, None).is_none());

        let anonymous = vec!["ANONYMOUS".to_string()];
        assert_eq!(select_mechanism(&anonymous, None).unwrap().name(), "ANONYMOUS");
        assert!(select_mechanism(&anonymous, Some(&creds)).is_none());
    }
}
