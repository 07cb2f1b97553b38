//! Domain error types
//!
//! These errors describe why a single chat operation failed. None of them is
//! fatal to the session: the controller reports them and keeps running.

use thiserror::Error;

use super::types::ConnectionState;

/// Errors from opening or writing to the chat connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No identity has been assigned, so there is no connection to use
    #[error("No active identity")]
    NoIdentity,

    /// The connection exists but is not accepting frames yet (or anymore)
    #[error("Connection is {state}, not open")]
    NotOpen { state: ConnectionState },

    /// The transport refused to open or to accept an outbound frame
    #[error("Transport error: {0}")]
    Transport(String),

    /// An outbound frame could not be serialized
    #[error("Failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from decoding an inbound frame
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match its declared kind
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// The frame was larger than the configured limit
    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
}

/// Errors from resolving a note proposal
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The confirmation request failed; whether the note was created is unknown
    #[error("Confirmation request failed, note state is uncertain: {0}")]
    RequestFailed(String),
}

/// Errors from validating user input before anything is sent
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,
}

/// Errors surfaced by the session controller
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Clearing the remote history failed; local state was left untouched
    #[error("Failed to clear chat history: {0}")]
    ClearFailed(String),
}

impl SessionError {
    /// Whether the error leaves the session in a degraded (disconnected) state
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            SessionError::Connection(ConnectionError::Transport(_))
                | SessionError::Connection(ConnectionError::NoIdentity)
                | SessionError::Connection(ConnectionError::NotOpen {
                    state: ConnectionState::Closed
                })
        )
    }
}
