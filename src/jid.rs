//! Jabber identifiers (`local@domain/resource`).
//!
//! Local and domain parts are lowercased on construction; the resource is
//! kept verbatim. Equality, ordering and hashing all use the normalized
//! triple, so two spellings of the same address compare equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length in bytes of any single JID part.
pub const MAX_PART_LEN: usize = 1023;

const FORBIDDEN_LOCAL: &[char] = &['"', '&', '\'', '/', ':', '<', '>', '@'];

/// JID parse and validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JidError {
    /// The domain part is empty.
    #[error("domain part is empty")]
    EmptyDomain,

    /// An `@` was present with nothing before it.
    #[error("local part is empty")]
    EmptyLocal,

    /// A `/` was present with nothing after it.
    #[error("resource part is empty")]
    EmptyResource,

    /// A part exceeds [`MAX_PART_LEN`].
    #[error("{0} part exceeds {MAX_PART_LEN} bytes")]
    TooLong(&'static str),

    /// The local part contains a character RFC6122 forbids.
    #[error("local part contains forbidden character {0:?}")]
    ForbiddenChar(char),
}

/// Jabber identifier.
///
/// Field order matters: the derived ordering compares local, then domain,
/// then resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    local: String,
    domain: String,
    resource: String,
}

impl Jid {
    /// Build a JID from its parts, validating and normalizing them.
    pub fn new(local: &str, domain: &str, resource: &str) -> Result<Self, JidError> {
        let domain = domain.trim_end_matches('.');
        if domain.is_empty() {
            return Err(JidError::EmptyDomain);
        }
        if let Some(c) = local.chars().find(|c| FORBIDDEN_LOCAL.contains(c)) {
            return Err(JidError::ForbiddenChar(c));
        }

        // Lowercasing can lengthen a part, so limits apply to the result
        let local = local.to_lowercase();
        let domain = domain.to_lowercase();
        if local.len() > MAX_PART_LEN {
            return Err(JidError::TooLong("local"));
        }
        if domain.len() > MAX_PART_LEN {
            return Err(JidError::TooLong("domain"));
        }
        if resource.len() > MAX_PART_LEN {
            return Err(JidError::TooLong("resource"));
        }

        Ok(Self {
            local,
            domain,
            resource: resource.to_string(),
        })
    }

    /// A bare domain JID (e.g. a server address).
    pub fn domain_only(domain: &str) -> Result<Self, JidError> {
        Self::new("", domain, "")
    }

    /// Local part (may be empty).
    pub fn local(&self) -> &str {
        &self.local
    }

    /// Domain part.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resource part (empty for bare JIDs).
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// True when the resource part is empty.
    pub fn is_bare(&self) -> bool {
        self.resource.is_empty()
    }

    /// Copy of this JID without its resource.
    pub fn bare(&self) -> Jid {
        Jid {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: String::new(),
        }
    }

    /// Copy of this JID with a different resource.
    pub fn with_resource(&self, resource: &str) -> Result<Jid, JidError> {
        Jid::new(&self.local, &self.domain, resource)
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, resource) = match s.split_once('/') {
            Some((_, "")) => return Err(JidError::EmptyResource),
            Some((rest, resource)) => (rest, resource),
            None => (s, ""),
        };
        let (local, domain) = match rest.split_once('@') {
            Some(("", _)) => return Err(JidError::EmptyLocal),
            Some((local, domain)) => (local, domain),
            None => ("", rest),
        };
        Jid::new(local, domain, resource)
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.local.is_empty() {
            write!(f, "{}@", self.local)?;
        }
        f.write_str(&self.domain)?;
        if !self.resource.is_empty() {
            write!(f, "/{}", self.resource)?;
        }
        Ok(())
    }
}
