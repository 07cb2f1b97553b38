//! Core domain modules
//!
//! Message log, fragment reconciliation and the note confirmation handshake.
//! Nothing in here touches the network directly; collaborators come in
//! through the traits in [`traits`].

pub mod confirmation;
pub mod errors;
pub mod message_log;
pub mod token_accumulator;
pub mod traits;
pub mod types;

pub use confirmation::{
    ConfirmRequest, ConfirmationCoordinator, NoteSuggestion, PendingProposal, Resolution,
};
pub use errors::{
    ConnectionError, ProtocolError, ResolutionError, SessionError, ValidationError,
};
pub use message_log::MessageLog;
pub use token_accumulator::{StreamingState, TokenAccumulator};
pub use traits::{NotesApi, NotesObserver};
pub use types::{ConnectionState, Identity, Message, MessageId, Role};
