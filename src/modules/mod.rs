//! Built-in extension modules.
//!
//! | Module        | Name          | Handles                                   |
//! |---------------|---------------|-------------------------------------------|
//! | [`Disco`]     | `disco`       | `disco#info` queries (XEP-0030)           |
//! | [`Ping`]      | `ping`        | `urn:xmpp:ping` requests (XEP-0199)       |
//! | [`KeepAlive`] | `keepalive`   | nothing inbound; pings the server while bound |
//! | [`Messaging`] | `messaging`   | chat and normal messages with a body      |

mod disco;
mod keepalive;
mod messaging;
mod ping;

pub use disco::{Disco, DiscoInfo, Identity};
pub use keepalive::KeepAlive;
pub use messaging::{MessageHandler, Messaging};
pub use ping::Ping;
