//! Message Log - the reconciled conversation
//!
//! The log is an immutable ordered sequence. Every update returns a new
//! snapshot and leaves the old one untouched, so a reader holding a snapshot
//! never observes a half-applied merge. Storage is shared copy-on-write.
//!
//! Invariant: at most one entry carries the streaming id, and it is the last.

use std::sync::Arc;

use super::types::{Message, MessageId, Role};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageLog {
    entries: Arc<Vec<Message>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// The in-progress assistant stream, if one is open
    pub fn streaming_entry(&self) -> Option<&Message> {
        self.last().filter(|m| m.is_streaming())
    }

    /// Append a finished entry
    ///
    /// An open stream is sealed on its partial content first, so the new entry
    /// never lands after a live stream.
    pub fn append(&self, message: Message) -> Self {
        let mut next = self.sealed(MessageId::partial);
        next.push(message);
        next
    }

    /// Replace the last entry in place, or append when the log is empty
    pub fn replace_last(&self, message: Message) -> Self {
        let mut next = self.clone();
        let entries = Arc::make_mut(&mut next.entries);
        match entries.last_mut() {
            Some(last) => *last = message,
            None => entries.push(message),
        }
        next
    }

    /// Merge a fragment into the open stream, or open a new stream with it
    pub fn append_or_merge_last(&self, fragment: &str) -> Self {
        let mut next = self.clone();
        let entries = Arc::make_mut(&mut next.entries);
        match entries.last_mut() {
            Some(last) if last.is_streaming() => last.content.push_str(fragment),
            _ => entries.push(Message::streaming(fragment)),
        }
        next
    }

    /// Finalize an open stream on whatever content it has, under a new id
    pub fn seal_stream(&self, id: MessageId) -> Self {
        self.sealed(|| id)
    }

    /// Count of entries with the given role
    pub fn count_role(&self, role: Role) -> usize {
        self.entries.iter().filter(|m| m.role == role).count()
    }

    fn sealed(&self, id: impl FnOnce() -> MessageId) -> Self {
        if self.streaming_entry().is_none() {
            return self.clone();
        }
        let mut next = self.clone();
        if let Some(last) = Arc::make_mut(&mut next.entries).last_mut() {
            last.id = id();
        }
        next
    }

    fn push(&mut self, message: Message) {
        Arc::make_mut(&mut self.entries).push(message);
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
