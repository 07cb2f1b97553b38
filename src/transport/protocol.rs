//! Chat wire protocol
//!
//! JSON text frames over the chat connection. Inbound frames are tagged by a
//! `type` field; outbound user turns are a bare `{"content": ...}` object.
//! Kinds this client does not know are reported as [`InboundEvent::Unknown`]
//! so newer backends do not break older clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ConfirmRequest, Message, MessageId, NoteSuggestion, ProtocolError, Role};

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Incremental piece of the assistant reply
    Token { content: String },
    /// Turn boundary; carries nothing
    End,
    /// Canonical, complete assistant reply
    Assistant(Message),
    /// A user turn that did not originate from this client
    User(Message),
    /// The assistant proposes creating a note
    Confirm(ConfirmRequest),
    /// Backend-side failure, shown inline
    Error(Message),
    /// A `type` this client does not understand
    Unknown { kind: String },
}

impl InboundEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Token { .. } => "TOKEN",
            Self::End => "END",
            Self::Assistant(_) => "ASSISTANT",
            Self::User(_) => "USER",
            Self::Confirm(_) => "CONFIRM",
            Self::Error(_) => "ERROR",
            Self::Unknown { kind } => kind,
        }
    }
}

/// Message ids arrive as strings or as numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

impl From<WireId> for MessageId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(id) => MessageId::Assigned(id),
            WireId::Number(n) => MessageId::Assigned(n.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum WireInbound {
    Token {
        #[serde(default)]
        content: String,
    },
    End {},
    Assistant(WireMessage),
    User(WireMessage),
    Confirm {
        #[serde(rename = "noteSuggestion", default)]
        note_suggestion: Option<Value>,
        #[serde(rename = "requestedSchema", default)]
        requested_schema: Option<Value>,
        #[serde(default)]
        content: Option<String>,
    },
    Error(WireMessage),
}

const KNOWN_KINDS: &[&str] = &["TOKEN", "END", "ASSISTANT", "USER", "CONFIRM", "ERROR"];

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
}

impl WireMessage {
    fn into_message(self, role: Role) -> Message {
        let id = self.id.map(MessageId::from).unwrap_or_else(MessageId::local);
        // Timestamps are advisory; an unparseable one is dropped, not an error
        let timestamp = self
            .timestamp
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok());
        Message::new(id, role, self.content).with_timestamp(timestamp)
    }
}

/// Decode one inbound text frame
pub fn decode(text: &str) -> Result<InboundEvent, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::Malformed("frame has no string `type` field".to_string()))?;

    if !KNOWN_KINDS.contains(&kind.as_str()) {
        return Ok(InboundEvent::Unknown { kind });
    }

    let wire: WireInbound = serde_json::from_value(value)
        .map_err(|e| ProtocolError::Malformed(format!("invalid {} frame: {}", kind, e)))?;

    Ok(match wire {
        WireInbound::Token { content } => InboundEvent::Token { content },
        WireInbound::End {} => InboundEvent::End,
        WireInbound::Assistant(msg) => InboundEvent::Assistant(msg.into_message(Role::Assistant)),
        WireInbound::User(msg) => InboundEvent::User(msg.into_message(Role::User)),
        WireInbound::Confirm {
            note_suggestion,
            requested_schema,
            content,
        } => InboundEvent::Confirm(ConfirmRequest {
            // A suggestion of the wrong shape degrades to the rationale
            note_suggestion: note_suggestion.as_ref().and_then(NoteSuggestion::from_schema),
            requested_schema,
            content,
        }),
        WireInbound::Error(msg) => InboundEvent::Error(msg.into_message(Role::Error)),
    })
}

/// An outbound frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    /// A user turn
    UserTurn { content: String },
}

impl OutboundEvent {
    pub fn user_turn(content: impl Into<String>) -> Self {
        Self::UserTurn {
            content: content.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_token() {
        let event = decode(r#"{"type":"TOKEN","content":"Hel"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Token {
                content: "Hel".into()
            }
        );
    }

    #[test]
    fn test_decode_end_with_and_without_payload() {
        assert_eq!(decode(r#"{"type":"END"}"#).unwrap(), InboundEvent::End);
        assert_eq!(
            decode(r#"{"type":"END","content":null}"#).unwrap(),
            InboundEvent::End
        );
    }

    #[test]
    fn test_decode_assistant_with_numeric_id() {
        let event = decode(r#"{"type":"ASSISTANT","id":42,"content":"Hello!"}"#).unwrap();
        let InboundEvent::Assistant(msg) = event else {
            panic!("expected assistant event");
        };
        assert_eq!(msg.id, MessageId::Assigned("42".into()));
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Hello!");
    }

    #[test]
    fn test_decode_user_keeps_timestamp() {
        let event = decode(
            r#"{"type":"USER","id":"u-9","content":"hi","timestamp":"2025-01-01T10:00:00Z"}"#,
        )
        .unwrap();
        let InboundEvent::User(msg) = event else {
            panic!("expected user event");
        };
        assert_eq!(msg.role, Role::User);
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn test_decode_confirm_with_suggestion() {
        let event = decode(
            r#"{"type":"CONFIRM","noteSuggestion":{"title":"Call mom","remindAt":"2025-01-01T10:00:00Z"}}"#,
        )
        .unwrap();
        let InboundEvent::Confirm(request) = event else {
            panic!("expected confirm event");
        };
        let suggestion = request.note_suggestion.unwrap();
        assert_eq!(suggestion.title.as_deref(), Some("Call mom"));
        assert_eq!(suggestion.remind_at.as_deref(), Some("2025-01-01T10:00:00Z"));
        assert!(suggestion.description.is_none());
    }

    #[test]
    fn test_confirm_with_odd_suggestion_still_decodes() {
        let event = decode(
            r#"{"type":"CONFIRM","noteSuggestion":{"title":"Call mom","remindAt":1735725600000},"content":"Save it?"}"#,
        )
        .unwrap();
        let InboundEvent::Confirm(request) = event else {
            panic!("expected confirm event");
        };
        let suggestion = request.note_suggestion.unwrap();
        assert_eq!(suggestion.title.as_deref(), Some("Call mom"));
        assert_eq!(suggestion.remind_at.as_deref(), Some("1735725600000"));

        let event = decode(r#"{"type":"CONFIRM","noteSuggestion":"Call mom","content":"Save it?"}"#)
            .unwrap();
        let InboundEvent::Confirm(request) = event else {
            panic!("expected confirm event");
        };
        assert!(request.note_suggestion.is_none());
        assert_eq!(request.content.as_deref(), Some("Save it?"));
    }

    #[test]
    fn test_decode_error_without_id() {
        let event = decode(r#"{"type":"ERROR","content":"model unavailable"}"#).unwrap();
        let InboundEvent::Error(msg) = event else {
            panic!("expected error event");
        };
        assert_eq!(msg.role, Role::Error);
        assert!(msg.id.as_str().starts_with("local-"));
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let event = decode(r#"{"type":"TYPING","who":"assistant"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Unknown {
                kind: "TYPING".into()
            }
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"content":"x"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        let Err(ProtocolError::Malformed(reason)) = decode(r#"{"type":"TOKEN","content":5}"#)
        else {
            panic!("expected malformed frame");
        };
        assert!(reason.contains("TOKEN"));
    }

    #[test]
    fn test_encode_user_turn() {
        let frame = OutboundEvent::user_turn("Remind me to call mom");
        assert_eq!(
            frame.encode().unwrap(),
            r#"{"content":"Remind me to call mom"}"#
        );
    }
}
