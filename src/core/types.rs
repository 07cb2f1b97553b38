//! Canonical type definitions for the chat domain
//!
//! Single source of truth for the message, identity and connection types
//! shared by the session, transport and CLI layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl Role {
    /// Get a short label for this role
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "you",
            Self::Assistant => "assistant",
            Self::Error => "error",
        }
    }
}

/// Identifier of a log entry
///
/// `Streaming` marks the single entry still being built from fragments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Streaming,
    Assigned(String),
}

impl MessageId {
    /// Id minted by the client: an optimistic user echo, or an inbound frame
    /// that carried no id of its own
    pub fn local() -> Self {
        Self::Assigned(format!("local-{}", uuid::Uuid::new_v4()))
    }

    /// Id for a stream that was cut off before the backend finalized it
    pub fn partial() -> Self {
        Self::Assigned(format!("partial-{}", uuid::Uuid::new_v4()))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Streaming => "stream",
            Self::Assigned(id) => id,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the conversation log
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Markdown for assistant messages, plain text otherwise
    pub content: String,
    /// Advisory only; never used for ordering
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    /// A user message typed locally, not yet acknowledged by the backend
    pub fn local_user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::local(),
            role: Role::User,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// A fresh in-progress assistant stream seeded with its first fragment
    pub fn streaming(fragment: impl Into<String>) -> Self {
        Self::new(MessageId::Streaming, Role::Assistant, fragment)
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.id.is_streaming()
    }
}

/// The active user and the credential that authorizes their connection
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Correlation key; the backend routes this user's turns by it
    pub user_id: String,
    pub id_token: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            id_token: id_token.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("id_token", &"[REDACTED]")
            .finish()
    }
}

/// Lifecycle of the chat connection
///
/// Connecting -> Open -> Closing -> Closed, or straight to Closed on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    #[default]
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
