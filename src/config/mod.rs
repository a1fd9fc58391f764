//! Session configuration.
//!
//! Supports configuration from:
//! - Builder calls on [`SessionConfig`]
//! - Environment variables ([`SessionConfig::from_env`])
//! - Any serde format the application chooses to load
//!
//! The session takes ownership of its config at construction and never
//! exposes a mutable reference, so the values read by `open()` are the
//! values the session was built with.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XmppError};
use crate::jid::Jid;

/// Default client-to-server port.
pub const DEFAULT_PORT: u16 = 5222;

/// Socket protocol used to reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// Stream over TCP (default)
    #[default]
    Tcp,
    /// Datagram transport
    Udp,
}

impl TransportProtocol {
    /// SRV protocol label (`_tcp`/`_udp`).
    pub fn srv_label(&self) -> &'static str {
        match self {
            Self::Tcp => "_tcp",
            Self::Udp => "_udp",
        }
    }
}

impl FromStr for TransportProtocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _ => Err(format!("Unknown transport protocol: {s}")),
        }
    }
}

/// When to negotiate STARTTLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsPolicy {
    /// Never upgrade, even if offered.
    Disabled,
    /// Upgrade when the server offers it.
    Optional,
    /// Fail negotiation unless the stream is upgraded (default)
    #[default]
    Required,
}

impl FromStr for TlsPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            "optional" => Ok(Self::Optional),
            "required" | "on" => Ok(Self::Required),
            _ => Err(format!("Unknown TLS policy: {s}")),
        }
    }
}

/// Authentication credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Local part used as the SASL authentication identity.
    pub username: String,
    /// Secret; never serialized.
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl Credentials {
    /// Build credentials.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a session needs to open a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Service domain (the JID domain part).
    pub domain: String,

    /// Explicit server host; defaults to the domain.
    pub server: Option<String>,

    /// Explicit server port; defaults to [`DEFAULT_PORT`].
    pub port: Option<u16>,

    /// Socket protocol.
    pub protocol: TransportProtocol,

    /// Skip SRV discovery and connect to `server`/`port` directly.
    pub disable_srv: bool,

    /// STARTTLS policy.
    pub tls: TlsPolicy,

    /// Resource requested at bind time; the server picks one when unset.
    pub resource: Option<String>,

    /// Default wait bound for correlated requests, in seconds.
    pub request_timeout_secs: Option<u64>,

    /// SASL credentials; `None` allows anonymous login.
    pub credentials: Option<Credentials>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            server: None,
            port: None,
            protocol: TransportProtocol::Tcp,
            disable_srv: false,
            tls: TlsPolicy::Required,
            credentials: None,
            resource: None,
            request_timeout_secs: Some(30),
        }
    }
}

impl SessionConfig {
    /// Config for a domain with all other values defaulted.
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let domain = var("JABBER_DOMAIN")
            .ok_or_else(|| XmppError::Config("JABBER_DOMAIN is not set".to_string()))?;
        let mut config = Self::new(&domain);

        config.server = var("JABBER_SERVER");
        if let Some(port) = var("JABBER_PORT") {
            config.port = Some(
                port.parse()
                    .map_err(|e| XmppError::Config(format!("Invalid JABBER_PORT: {e}")))?,
            );
        }
        if let Some(flag) = var("JABBER_DISABLE_SRV") {
            config.disable_srv = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(tls) = var("JABBER_TLS") {
            config.tls = tls.parse().map_err(XmppError::Config)?;
        }
        if let Some(username) = var("JABBER_USERNAME") {
            let password = var("JABBER_PASSWORD").unwrap_or_default();
            config.credentials = Some(Credentials::new(&username, &password));
        }
        config.resource = var("JABBER_RESOURCE");

        config.validate()?;
        Ok(config)
    }

    /// Builder: explicit server host and port.
    pub fn with_server(mut self, host: &str, port: u16) -> Self {
        self.server = Some(host.to_string());
        self.port = Some(port);
        self
    }

    /// Builder: disable SRV discovery.
    pub fn with_srv_disabled(mut self) -> Self {
        self.disable_srv = true;
        self
    }

    /// Builder: TLS policy.
    pub fn with_tls(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    /// Builder: credentials.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Builder: bind resource.
    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    /// Builder: default request timeout (`None` waits indefinitely).
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_secs = timeout.map(|t| t.as_secs().max(1));
        self
    }

    /// Default request timeout.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Host used when SRV discovery is bypassed.
    pub fn direct_host(&self) -> &str {
        self.server.as_deref().unwrap_or(&self.domain)
    }

    /// Port used when SRV discovery is bypassed.
    pub fn direct_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Check the config before a session is opened with it.
    pub fn validate(&self) -> Result<()> {
        Jid::domain_only(&self.domain)
            .map_err(|e| XmppError::Config(format!("Invalid domain '{}': {e}", self.domain)))?;
        if self.port == Some(0) {
            return Err(XmppError::Config("Port must be non-zero".to_string()));
        }
        if self.server.as_deref().is_some_and(str::is_empty) {
            return Err(XmppError::Config("Server host is empty".to_string()));
        }
        if let Some(creds) = &self.credentials {
            if creds.username.is_empty() {
                return Err(XmppError::Config("Username is empty".to_string()));
            }
        }
        if let Some(resource) = &self.resource {
            Jid::new("", &self.domain, resource)
                .map_err(|e| XmppError::Config(format!("Invalid resource: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::new("example.com");
        assert_eq!(config.direct_host(), "example.com");
        assert_eq!(config.direct_port(), 5222);
        assert_eq!(config.tls, TlsPolicy::Required);
        assert_eq!(config.protocol, TransportProtocol::Tcp);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new("example.com")
            .with_server("host1", 5223)
            .with_srv_disabled()
            .with_credentials("juliet", "r0m30")
            .with_resource("balcony")
            .with_request_timeout(None);
        assert_eq!(config.direct_host(), "host1");
        assert_eq!(config.direct_port(), 5223);
        assert!(config.disable_srv);
        assert_eq!(config.request_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SessionConfig::new("").validate().is_err());
        assert!(SessionConfig::new("example.com")
            .with_server("", 5222)
            .validate()
            .is_err());
        assert!(SessionConfig::new("example.com")
            .with_server("host", 0)
            .validate()
            .is_err());
        assert!(SessionConfig::new("example.com")
            .with_credentials("", "pw")
            .validate()
            .is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("juliet", "s3cret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("juliet"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            domain = "example.com"
            server = "xmpp.example.com"
            port = 5223
            disable_srv = true
            tls = "optional"
            resource = "laptop"

            [credentials]
            username = "juliet"
            password = "r0m30"
        "#;

        let config: SessionConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.domain, "example.com");
        assert_eq!(config.direct_port(), 5223);
        assert_eq!(config.tls, TlsPolicy::Optional);
        assert_eq!(config.credentials.as_ref().unwrap().password, "r0m30");
        // Unspecified fields keep their defaults
        assert_eq!(config.request_timeout_secs, Some(30));

        let serialized = toml::to_string(&config).unwrap();
        assert!(!serialized.contains("r0m30"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("OFF".parse::<TlsPolicy>().unwrap(), TlsPolicy::Disabled);
        assert_eq!("udp".parse::<TransportProtocol>().unwrap(), TransportProtocol::Udp);
        assert!("maybe".parse::<TlsPolicy>().is_err());
    }
}
