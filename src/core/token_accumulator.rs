//! Token Accumulator - turns fragment deliveries into log entries
//!
//! Handles:
//! - Merging TOKEN fragments into the open assistant stream (receipt order)
//! - Replacing the stream with the backend's canonical ASSISTANT message
//! - Sealing a stream that was cut off by a dropped connection
//!
//! The accumulator never mutates the log it is given; it returns the next
//! snapshot and tracks a small streaming state for diagnostics.

use super::message_log::MessageLog;
use super::types::{Message, MessageId};

/// Streaming state of the current assistant turn
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamingState {
    /// No stream has started since the last turn boundary
    #[default]
    Idle,
    /// Fragments are being merged into the open stream
    Receiving { fragments: usize, bytes: usize },
    /// The backend delivered the final message for the turn
    Finalized,
    /// The connection dropped mid-stream and the partial reply was kept
    Interrupted,
}

impl StreamingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Receiving { .. } => "Receiving",
            Self::Finalized => "Finalized",
            Self::Interrupted => "Interrupted",
        }
    }
}

#[derive(Debug, Default)]
pub struct TokenAccumulator {
    state: StreamingState,
}

impl TokenAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StreamingState {
        &self.state
    }

    /// Apply a TOKEN fragment
    ///
    /// Appends to the open stream when the last entry is one; otherwise a new
    /// stream is opened. A fragment arriving after a finalize therefore starts
    /// a new turn rather than extending the closed entry.
    pub fn on_fragment(&mut self, log: &MessageLog, fragment: &str) -> MessageLog {
        let (fragments, bytes) = match (&self.state, log.streaming_entry()) {
            (StreamingState::Receiving { fragments, bytes }, Some(_)) => {
                (fragments + 1, bytes + fragment.len())
            }
            _ => (1, fragment.len()),
        };
        self.state = StreamingState::Receiving { fragments, bytes };
        log.append_or_merge_last(fragment)
    }

    /// Apply an ASSISTANT final message
    ///
    /// The open stream is replaced in place so the canonical text wins over
    /// the concatenated fragments. Without a stream the message is appended.
    pub fn on_final(&mut self, log: &MessageLog, message: Message) -> MessageLog {
        if let StreamingState::Receiving { fragments, bytes } = self.state {
            tracing::debug!(
                fragments,
                streamed_bytes = bytes,
                final_bytes = message.content.len(),
                "finalizing assistant stream"
            );
        }
        self.state = StreamingState::Finalized;

        if log.streaming_entry().is_some() {
            log.replace_last(message)
        } else {
            log.append(message)
        }
    }

    /// Apply an END marker. Never touches the log.
    pub fn on_end(&mut self) {
        if matches!(self.state, StreamingState::Finalized) {
            self.state = StreamingState::Idle;
        }
    }

    /// Keep a partial reply when its connection goes away
    pub fn on_interrupted(&mut self, log: &MessageLog) -> MessageLog {
        if log.streaming_entry().is_none() {
            return log.clone();
        }
        self.state = StreamingState::Interrupted;
        log.seal_stream(MessageId::partial())
    }

    pub fn reset(&mut self) {
        self.state = StreamingState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;

    fn final_message(id: &str, content: &str) -> Message {
        Message::new(MessageId::Assigned(id.to_string()), Role::Assistant, content)
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let mut acc = TokenAccumulator::new();
        let log = MessageLog::new();
        let log = acc.on_fragment(&log, "Hel");
        let log = acc.on_fragment(&log, "lo");

        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().content, "Hello");
        assert!(log.last().unwrap().is_streaming());
        assert_eq!(
            acc.state(),
            &StreamingState::Receiving {
                fragments: 2,
                bytes: 5
            }
        );
    }

    #[test]
    fn test_final_replaces_stream() {
        let mut acc = TokenAccumulator::new();
        let log = MessageLog::new();
        let log = acc.on_fragment(&log, "Hel");
        let log = acc.on_fragment(&log, "lo");
        let log = acc.on_final(&log, final_message("42", "Hello!"));

        assert_eq!(log.len(), 1);
        let last = log.last().unwrap();
        assert_eq!(last.content, "Hello!");
        assert_eq!(last.id.as_str(), "42");
        assert_eq!(acc.state(), &StreamingState::Finalized);
    }

    #[test]
    fn test_final_without_stream_appends() {
        let mut acc = TokenAccumulator::new();
        let log = MessageLog::new().append(Message::local_user("hi"));
        let log = acc.on_final(&log, final_message("7", "Hi there"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().content, "Hi there");
    }

    #[test]
    fn test_fragment_after_final_starts_new_entry() {
        let mut acc = TokenAccumulator::new();
        let log = MessageLog::new();
        let log = acc.on_fragment(&log, "one");
        let log = acc.on_final(&log, final_message("1", "one"));
        let log = acc.on_fragment(&log, "two");

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].content, "one");
        assert_eq!(log.entries()[1].content, "two");
        assert!(log.entries()[1].is_streaming());
    }

    #[test]
    fn test_end_is_a_noop_on_the_log() {
        let mut acc = TokenAccumulator::new();
        acc.on_end();
        let log = acc.on_fragment(&MessageLog::new(), "x");
        acc.on_end();
        assert_eq!(log.last().unwrap().content, "x");
        assert!(log.last().unwrap().is_streaming());
    }

    #[test]
    fn test_interrupted_stream_keeps_partial_content() {
        let mut acc = TokenAccumulator::new();
        let log = acc.on_fragment(&MessageLog::new(), "half a rep");
        let log = acc.on_interrupted(&log);

        assert_eq!(log.len(), 1);
        assert!(!log.last().unwrap().is_streaming());
        assert_eq!(log.last().unwrap().content, "half a rep");
        assert_eq!(acc.state(), &StreamingState::Interrupted);
    }
}
