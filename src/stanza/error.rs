//! Stanza-level errors (RFC6120 §8.3).

use std::fmt;
use std::str::FromStr;

use crate::document::Element;
use crate::ns;

/// How the receiver should react to the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Retry after providing credentials.
    Auth,
    /// Do not retry.
    Cancel,
    /// Proceed; the condition was only a warning.
    Continue,
    /// Retry after changing the data sent.
    Modify,
    /// Retry after waiting.
    Wait,
}

impl ErrorType {
    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Cancel => "cancel",
            Self::Continue => "continue",
            Self::Modify => "modify",
            Self::Wait => "wait",
        }
    }
}

impl FromStr for ErrorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Self::Auth),
            "cancel" => Ok(Self::Cancel),
            "continue" => Ok(Self::Continue),
            "modify" => Ok(Self::Modify),
            "wait" => Ok(Self::Wait),
            _ => Err(format!("Unknown error type: {s}")),
        }
    }
}

/// The `<error/>` child of an error stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaError {
    /// Error type.
    pub error_type: ErrorType,
    /// Defined condition element name, e.g. `item-not-found`.
    pub condition: String,
    /// Optional human-readable description.
    pub text: Option<String>,
}

impl StanzaError {
    /// Build an error with the given type and condition.
    pub fn new(error_type: ErrorType, condition: &str) -> Self {
        Self {
            error_type,
            condition: condition.to_string(),
            text: None,
        }
    }

    /// `cancel/service-unavailable`, the answer to requests nobody handles.
    pub fn service_unavailable() -> Self {
        Self::new(ErrorType::Cancel, "service-unavailable")
    }

    /// `cancel/feature-not-implemented`.
    pub fn feature_not_implemented() -> Self {
        Self::new(ErrorType::Cancel, "feature-not-implemented")
    }

    /// `modify/bad-request`.
    pub fn bad_request() -> Self {
        Self::new(ErrorType::Modify, "bad-request")
    }

    /// Attach descriptive text.
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Parse the `<error/>` child of a stanza, if present.
    pub fn from_stanza(stanza: &Element) -> Option<Self> {
        let el = stanza.get_child("error", ns::CLIENT)?;
        // Servers in the wild omit the type; treat that as cancel
        let error_type = el
            .attr("type")
            .and_then(|t| t.parse().ok())
            .unwrap_or(ErrorType::Cancel);
        let condition = el
            .children()
            .find(|c| c.ns() == ns::STANZAS && c.name() != "text")
            .map_or_else(|| "undefined-condition".to_string(), |c| c.name().to_string());
        let text = el.get_child("text", ns::STANZAS).map(Element::text);

        Some(Self {
            error_type,
            condition,
            text,
        })
    }
}

impl From<&StanzaError> for Element {
    fn from(err: &StanzaError) -> Self {
        let mut el = Element::new("error", ns::CLIENT)
            .with_attr("type", err.error_type.as_str())
            .with_child(Element::new(err.condition.as_str(), ns::STANZAS));
        if let Some(text) = &err.text {
            el.append_child(Element::new("text", ns::STANZAS).with_text(text.as_str()));
        }
        el
    }
}

impl fmt::Display for StanzaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.error_type.as_str(), self.condition)?;
        if let Some(text) = &self.text {
            write!(f, ": {text}")?;
        }
        Ok(())
    }
}
