//! Session Events
//!
//! Notifications sent from the session controller to whatever renders it.
//! They carry snapshots, never handles into the controller's state.

use crate::core::{ConnectionState, MessageLog, PendingProposal};

pub type SessionEventSender = tokio::sync::mpsc::UnboundedSender<SessionEvent>;
pub type SessionEventReceiver = tokio::sync::mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The message log has a new snapshot
    LogChanged(MessageLog),

    /// A note proposal needs the user's decision
    ProposalPresented(PendingProposal),

    /// The pending proposal was resolved or discarded
    ProposalCleared,

    /// The backend marked the end of an assistant turn
    TurnEnded,

    /// The connection moved to a new state
    ConnectionChanged(ConnectionState),

    /// Something failed without stopping the session
    Notice(String),
}
