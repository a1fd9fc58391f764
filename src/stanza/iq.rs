//! Info/query stanzas: the request/response form.

use std::str::FromStr;

use super::{ErrorType, StanzaError, StanzaHeader};
use crate::document::Element;
use crate::error::{Result, XmppError};
use crate::jid::Jid;
use crate::ns;

/// IQ type. `Get`/`Set` are requests, `Result`/`Error` answer them by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqType {
    /// Retrieve information.
    Get,
    /// Provide data or change state.
    Set,
    /// Successful response.
    Result,
    /// Failed response.
    Error,
}

impl IqType {
    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
            Self::Error => "error",
        }
    }

    /// Get or set.
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Get | Self::Set)
    }

    /// Result or error.
    pub fn is_response(&self) -> bool {
        !self.is_request()
    }
}

impl FromStr for IqType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "get" => Ok(Self::Get),
            "set" => Ok(Self::Set),
            "result" => Ok(Self::Result),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown iq type: {s}")),
        }
    }
}

/// Request/response stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iq {
    /// Common attributes.
    pub header: StanzaHeader,
    /// IQ type.
    pub kind: IqType,
    /// The single payload child (required for get/set).
    pub payload: Option<Element>,
    /// Error details for `error` responses.
    pub error: Option<StanzaError>,
}

impl Iq {
    fn request(kind: IqType, payload: Element) -> Self {
        Self {
            header: StanzaHeader::default(),
            kind,
            payload: Some(payload),
            error: None,
        }
    }

    /// A `get` request carrying `payload`.
    pub fn get(payload: Element) -> Self {
        Self::request(IqType::Get, payload)
    }

    /// A `set` request carrying `payload`.
    pub fn set(payload: Element) -> Self {
        Self::request(IqType::Set, payload)
    }

    /// Builder: set the recipient.
    pub fn with_to(mut self, to: Jid) -> Self {
        self.header.to = Some(to);
        self
    }

    /// Builder: set the id.
    pub fn with_id(mut self, id: &str) -> Self {
        self.header.id = id.to_string();
        self
    }

    /// Stanza id (may be empty).
    pub fn id(&self) -> &str {
        &self.header.id
    }

    /// Namespace of the payload child, the usual routing key.
    pub fn payload_ns(&self) -> Option<&str> {
        self.payload.as_ref().map(Element::ns)
    }

    /// Whether the payload is `<name xmlns=ns/>`.
    pub fn payload_is(&self, name: &str, ns: &str) -> bool {
        self.payload.as_ref().is_some_and(|p| p.is(name, ns))
    }

    /// `result` answering this request.
    pub fn result_reply(&self, payload: Option<Element>) -> Iq {
        Iq {
            header: self.header.reply(),
            kind: IqType::Result,
            payload,
            error: None,
        }
    }

    /// `error` answering this request. The original payload is echoed back.
    pub fn error_reply(&self, error: StanzaError) -> Iq {
        Iq {
            header: self.header.reply(),
            kind: IqType::Error,
            payload: self.payload.clone(),
            error: Some(error),
        }
    }

    /// Turn an `error` response into `Err`, for callers that want `?`.
    pub fn into_result(self) -> Result<Iq> {
        if self.kind != IqType::Error {
            return Ok(self);
        }
        let error = self
            .error
            .unwrap_or_else(|| StanzaError::new(ErrorType::Cancel, "undefined-condition"));
        Err(XmppError::Stanza(error))
    }
}

impl TryFrom<&Element> for Iq {
    type Error = XmppError;

    fn try_from(el: &Element) -> Result<Self> {
        if !el.is("iq", ns::CLIENT) {
            return Err(XmppError::InvalidStanza(format!("<{}/> is not an iq", el.name())));
        }
        let header = StanzaHeader::parse(el)?;
        let kind: IqType = el
            .attr("type")
            .ok_or_else(|| XmppError::InvalidStanza("iq without type".to_string()))?
            .parse()
            .map_err(XmppError::InvalidStanza)?;

        if header.id.is_empty() {
            return Err(XmppError::InvalidStanza("iq without id".to_string()));
        }

        let payload = el
            .children()
            .find(|c| !c.is("error", ns::CLIENT))
            .cloned();
        if kind.is_request() && payload.is_none() {
            return Err(XmppError::InvalidStanza(format!(
                "iq {} without payload",
                kind.as_str()
            )));
        }
        let error = if kind == IqType::Error {
            StanzaError::from_stanza(el)
        } else {
            None
        };

        Ok(Self {
            header,
            kind,
            payload,
            error,
        })
    }
}

impl From<&Iq> for Element {
    fn from(iq: &Iq) -> Self {
        let mut el = iq
            .header
            .apply(Element::new("iq", ns::CLIENT))
            .with_attr("type", iq.kind.as_str());
        if let Some(payload) = &iq.payload {
            el.append_child(payload.clone());
        }
        if let Some(error) = &iq.error {
            el.append_child(error.into());
        }
        el
    }
}
