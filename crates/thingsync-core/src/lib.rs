//! # thingsync-core
//!
//! Domain types shared by every thingsync crate.
//!
//! - [`item`]: the synchronized `Item` ("thing") and its name validation
//! - [`user`]: anonymous user identity attached to a session
//! - [`ids`]: branded identifiers for session keys and connections
//! - [`protocol`]: the `{resource, event, content}` wire envelope

#![deny(unsafe_code)]

pub mod ids;
pub mod item;
pub mod protocol;
pub mod user;

pub use ids::{ConnectionId, SessionKey};
pub use item::{Item, ItemCandidate, MAX_NAME_LENGTH, NameError, escape_html, sanitize_name};
pub use protocol::{ErrorContent, Event, IncomingMessage, OutgoingMessage, ProtocolError, Resource};
pub use user::{User, UserId};
