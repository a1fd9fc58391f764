//! Session state machine.
//!
//! | From          | To                        | Trigger                               |
//! |---------------|---------------------------|---------------------------------------|
//! | `Closed`      | `Connecting`              | `open()`                              |
//! | `Connecting`  | `Negotiating`             | transport reports open                |
//! | `Connecting`  | `Closed`                  | transport error or close              |
//! | `Negotiating` | `Bound`                   | TLS, SASL and bind steps complete     |
//! | any but `Closed`/`Closing` | `Closing`    | `close()`, transport close or error   |
//! | `Closing`     | `Closed`                  | transport confirms close              |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No stream. Initial and re-enterable terminal state.
    #[default]
    Closed,
    /// Transport is connecting.
    Connecting,
    /// Stream open, features being negotiated.
    Negotiating,
    /// Resource bound; stanzas flow.
    Bound,
    /// Stream shutting down.
    Closing,
}

impl SessionState {
    /// Whether the state machine allows `self` → `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::{Bound, Closed, Closing, Connecting, Negotiating};
        matches!(
            (self, next),
            (Closed, Connecting)
                | (Connecting, Negotiating | Closed | Closing)
                | (Negotiating | Bound, Closing)
                | (Negotiating, Bound)
                | (Closing, Closed)
        )
    }

    /// Whether a stream exists (connecting through closing).
    pub fn is_active(self) -> bool {
        self != SessionState::Closed
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Negotiating => "negotiating",
            Self::Bound => "bound",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
