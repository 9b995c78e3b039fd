//! Wire envelope exchanged between the hub and clients.
//!
//! Every frame is one JSON object `{resource, event, content}`. Inbound
//! frames are parsed leniently: `method` is accepted as an alias for
//! `event`, and both names match case-insensitively. Outbound frames always
//! use lowercase names.
//!
//! | resource | event                     | content                  |
//! |----------|---------------------------|--------------------------|
//! | things   | list                      | array of items           |
//! | things   | create / update / delete  | one item                 |
//! | things   | error                     | `{kind, message}`        |
//! | users    | list                      | array of users           |
//! | users    | create / delete           | one user (join / leave)  |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::ItemCandidate;

/// Collection an envelope refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Things,
    Users,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Things => "things",
            Self::Users => "users",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "things" => Ok(Self::Things),
            "users" => Ok(Self::Users),
            _ => Err(ProtocolError::UnknownResource(s.to_string())),
        }
    }
}

/// What happened (outbound) or what is requested (inbound).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Create,
    Update,
    Delete,
    List,
    Error,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "list" => Ok(Self::List),
            "error" => Ok(Self::Error),
            _ => Err(ProtocolError::UnknownEvent(s.to_string())),
        }
    }
}

/// A frame received from a client, before dispatch.
///
/// `resource` and `event` stay raw strings so an unknown value surfaces as
/// [`ProtocolError::UnknownResource`] / [`ProtocolError::UnknownEvent`]
/// rather than a generic parse failure.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct IncomingMessage {
    pub resource: String,
    #[serde(alias = "method")]
    pub event: String,
    #[serde(default)]
    pub content: Value,
}

impl IncomingMessage {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    pub fn resource(&self) -> Result<Resource, ProtocolError> {
        self.resource.parse()
    }

    pub fn event(&self) -> Result<Event, ProtocolError> {
        self.event.parse()
    }

    /// Interpret `content` as a partial item. Missing content reads as empty.
    pub fn candidate(&self) -> Result<ItemCandidate, ProtocolError> {
        if self.content.is_null() {
            return Ok(ItemCandidate::default());
        }
        serde_json::from_value(self.content.clone())
            .map_err(|e| ProtocolError::MalformedContent(e.to_string()))
    }
}

impl fmt::Display for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.event, self.resource, self.content)
    }
}

/// A frame sent to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutgoingMessage<T> {
    pub resource: Resource,
    pub event: Event,
    pub content: T,
}

impl<T: Serialize> OutgoingMessage<T> {
    pub fn new(resource: Resource, event: Event, content: T) -> Self {
        Self {
            resource,
            event,
            content,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Body of a sender-scoped `things/error` reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContent {
    pub kind: String,
    pub message: String,
}

/// Malformed or unsupported client request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown resource '{0}'")]
    UnknownResource(String),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("malformed content: {0}")]
    MalformedContent(String),
}

impl ProtocolError {
    /// Short classification string for logs and error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownResource(_) => "unknown_resource",
            Self::UnknownEvent(_) => "unknown_event",
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::MalformedContent(_) => "malformed_content",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_event_key() {
        let msg =
            IncomingMessage::parse(r#"{"resource":"things","event":"create","content":{"name":"Swill"}}"#)
                .unwrap();
        assert_eq!(msg.resource().unwrap(), Resource::Things);
        assert_eq!(msg.event().unwrap(), Event::Create);
        assert_eq!(msg.candidate().unwrap(), ItemCandidate::named("Swill"));
    }

    #[test]
    fn accepts_method_alias() {
        let msg = IncomingMessage::parse(r#"{"resource":"things","method":"delete","content":{"id":1}}"#)
            .unwrap();
        assert_eq!(msg.event().unwrap(), Event::Delete);
        assert_eq!(msg.candidate().unwrap(), ItemCandidate::with_id(1));
    }

    #[test]
    fn names_match_case_insensitively() {
        let msg = IncomingMessage::parse(r#"{"resource":"THINGS","event":"Update"}"#).unwrap();
        assert_eq!(msg.resource().unwrap(), Resource::Things);
        assert_eq!(msg.event().unwrap(), Event::Update);
    }

    #[test]
    fn missing_content_is_empty_candidate() {
        let msg = IncomingMessage::parse(r#"{"resource":"things","event":"list"}"#).unwrap();
        assert!(msg.content.is_null());
        assert_eq!(msg.candidate().unwrap(), ItemCandidate::default());
    }

    #[test]
    fn unknown_resource_and_event() {
        let msg = IncomingMessage::parse(r#"{"resource":"widgets","event":"explode"}"#).unwrap();
        assert_eq!(
            msg.resource(),
            Err(ProtocolError::UnknownResource("widgets".into()))
        );
        assert_eq!(msg.event(), Err(ProtocolError::UnknownEvent("explode".into())));
    }

    #[test]
    fn non_json_is_malformed_envelope() {
        let err = IncomingMessage::parse("not json").unwrap_err();
        assert_eq!(err.kind(), "malformed_envelope");
    }

    #[test]
    fn missing_event_is_malformed_envelope() {
        let err = IncomingMessage::parse(r#"{"resource":"things"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
    }

    #[test]
    fn content_of_wrong_shape_is_malformed_content() {
        let msg =
            IncomingMessage::parse(r#"{"resource":"things","event":"create","content":{"id":"one"}}"#)
                .unwrap();
        assert_eq!(msg.candidate().unwrap_err().kind(), "malformed_content");
    }

    #[test]
    fn outgoing_uses_lowercase_names() {
        let msg = OutgoingMessage::new(Resource::Users, Event::Create, json!({"id": 1, "name": ""}));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["resource"], "users");
        assert_eq!(value["event"], "create");
        assert_eq!(value["content"]["id"], 1);
    }

    #[test]
    fn display_is_readable() {
        let msg = IncomingMessage::parse(r#"{"resource":"things","event":"delete","content":{"id":2}}"#)
            .unwrap();
        assert_eq!(msg.to_string(), r#"delete things: {"id":2}"#);
    }
}
