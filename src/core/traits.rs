//! Core traits for the domain layer
//!
//! These traits define the collaborators the chat session depends on,
//! allowing the HTTP client to be injected and tests to use in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;

/// REST endpoints the chat session calls besides the stream itself
#[async_trait]
pub trait NotesApi: Send + Sync {
    /// Tell the backend whether the proposed note should be created
    async fn confirm_creation(&self, chat_id: &str, confirmed: bool) -> Result<()>;

    /// Drop the backend's chat history for this user
    async fn clear_history(&self, chat_id: &str) -> Result<()>;
}

/// Receives a signal whenever the notes collection changed because of the chat
///
/// Implementors typically refetch their notes list.
pub trait NotesObserver: Send + Sync {
    fn notes_changed(&self);
}
