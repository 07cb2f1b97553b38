//! Session Controller - orchestrates one chat session
//!
//! Owns the message log and the pending proposal; nothing else mutates them.
//! Inbound connection events and user calls are handled one at a time
//! through `&mut self`, so every update is applied whole before the next
//! one starts. Renderers get snapshots via [`SessionEvent`]s or
//! [`SessionController::snapshot`].

use std::sync::Arc;

use crate::config::Config;
use crate::core::{
    ConfirmationCoordinator, ConnectionError, ConnectionState, Identity, Message, MessageLog,
    NotesApi, NotesObserver, PendingProposal, Resolution, ResolutionError, SessionError,
    StreamingState,
    TokenAccumulator, ValidationError,
};
use crate::transport::connection::{
    ConnectionEnvelope, ConnectionEvent, ConnectionEvents, ConnectionManager, Connector,
};
use crate::transport::protocol::{self, InboundEvent, OutboundEvent};

use super::events::{SessionEvent, SessionEventSender};

/// Immutable view of the session at one point in time
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub user_id: Option<String>,
    pub connection: ConnectionState,
    pub log: MessageLog,
    pub proposal: Option<PendingProposal>,
    pub streaming: StreamingState,
}

pub struct SessionController {
    connection: ConnectionManager,
    api: Arc<dyn NotesApi>,
    identity: Option<Identity>,
    log: MessageLog,
    accumulator: TokenAccumulator,
    confirmation: ConfirmationCoordinator,
    events_tx: SessionEventSender,
}

impl SessionController {
    /// Create a controller with no identity
    ///
    /// The returned receiver carries connection events; feed each one to
    /// [`SessionController::handle_connection_event`].
    pub fn new(
        connector: Arc<dyn Connector>,
        api: Arc<dyn NotesApi>,
        config: Config,
        events_tx: SessionEventSender,
    ) -> (Self, ConnectionEvents) {
        let (connection, inbound) = ConnectionManager::new(connector, config);
        let controller = Self {
            connection,
            api,
            identity: None,
            log: MessageLog::new(),
            accumulator: TokenAccumulator::new(),
            confirmation: ConfirmationCoordinator::new(),
            events_tx,
        };
        (controller, inbound)
    }

    /// Register the collaborator told about notes created through the chat
    pub fn with_notes_observer(mut self, observer: Arc<dyn NotesObserver>) -> Self {
        self.confirmation.set_observer(Some(observer));
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn pending_proposal(&self) -> Option<&PendingProposal> {
        self.confirmation.pending()
    }

    /// Whether the next user input is a decision on a proposal
    pub fn awaiting_decision(&self) -> bool {
        self.confirmation.has_pending()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.identity.as_ref().map(|i| i.user_id.clone()),
            connection: self.connection.state(),
            log: self.log.clone(),
            proposal: self.confirmation.pending().cloned(),
            streaming: self.accumulator.state().clone(),
        }
    }

    /// Switch the session to `identity`
    ///
    /// The previous connection is closed before anything else happens, the
    /// log and any proposal are dropped, and a fresh connection is opened.
    /// Assigning the identity that is already active does nothing while its
    /// connection is live; after a drop it reconnects.
    pub fn set_identity(&mut self, identity: Identity) {
        let live = matches!(
            self.connection.state(),
            ConnectionState::Connecting | ConnectionState::Open
        );
        if live && self.identity.as_ref() == Some(&identity) {
            return;
        }
        tracing::info!(user_id = %identity.user_id, "switching session identity");

        self.connection.close();
        self.reset_conversation();
        self.connection.open(&identity);
        self.identity = Some(identity);
        self.emit(SessionEvent::ConnectionChanged(self.connection.state()));
    }

    /// Tear the session down without opening a new connection
    pub fn sign_out(&mut self) {
        if self.identity.take().is_none() {
            return;
        }
        tracing::info!("signing out of chat session");
        self.connection.detach();
        self.reset_conversation();
        self.emit(SessionEvent::ConnectionChanged(ConnectionState::Closed));
    }

    /// Send a user turn and echo it into the log right away
    ///
    /// Blank input and a connection that is not open are rejected before
    /// anything is sent or logged.
    pub fn send_user_message(&mut self, text: &str) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        self.connection.send(&OutboundEvent::user_turn(text))?;
        self.update_log(self.log.append(Message::local_user(text)));
        Ok(())
    }

    /// Apply one decoded inbound event
    pub fn dispatch(&mut self, event: InboundEvent) {
        tracing::debug!(kind = event.kind(), "dispatching inbound event");
        match event {
            InboundEvent::Token { content } => {
                let next = self.accumulator.on_fragment(&self.log, &content);
                self.update_log(next);
            }
            InboundEvent::End => {
                self.accumulator.on_end();
                self.emit(SessionEvent::TurnEnded);
            }
            InboundEvent::Assistant(message) => {
                let next = self.accumulator.on_final(&self.log, message);
                self.update_log(next);
            }
            InboundEvent::User(message) | InboundEvent::Error(message) => {
                self.update_log(self.log.append(message));
            }
            InboundEvent::Confirm(request) => {
                let Some(chat_id) = self.identity.as_ref().map(|i| i.user_id.clone()) else {
                    tracing::warn!("ignoring CONFIRM without an active identity");
                    return;
                };
                let proposal = self.confirmation.on_confirm(&chat_id, request).clone();
                self.emit(SessionEvent::ProposalPresented(proposal));
            }
            InboundEvent::Unknown { kind } => {
                tracing::warn!(%kind, "ignoring unknown inbound event type");
            }
        }
    }

    /// Decode one inbound text frame and apply it
    ///
    /// A frame that does not decode leaves the session untouched.
    pub fn receive_frame(&mut self, text: &str) -> Result<(), SessionError> {
        let inbound = protocol::decode(text)?;
        self.dispatch(inbound);
        Ok(())
    }

    /// Apply one event from the connection receiver
    pub fn handle_connection_event(&mut self, envelope: ConnectionEnvelope) {
        let Some(event) = self.connection.accept(envelope) else {
            return;
        };

        match event {
            ConnectionEvent::Opened => {
                self.emit(SessionEvent::ConnectionChanged(ConnectionState::Open));
            }
            ConnectionEvent::Frame(text) => {
                if let Err(err) = self.receive_frame(&text) {
                    tracing::warn!("ignoring inbound frame: {}", err);
                }
            }
            ConnectionEvent::Closed { reason } => {
                tracing::debug!(
                    streaming = self.accumulator.state().as_str(),
                    "connection closed during turn"
                );
                // The turn is over; keep whatever part of the reply arrived
                let next = self.accumulator.on_interrupted(&self.log);
                if next != self.log {
                    self.update_log(next);
                }
                self.emit(SessionEvent::ConnectionChanged(ConnectionState::Closed));
                self.emit(SessionEvent::Notice(format!("Chat disconnected: {}", reason)));
            }
        }
    }

    /// Answer the pending proposal
    ///
    /// The proposal is gone afterwards whether or not the request worked.
    pub async fn resolve(&mut self, accepted: bool) -> Result<Resolution, SessionError> {
        let had_pending = self.confirmation.has_pending();
        let api = Arc::clone(&self.api);
        let result = self.confirmation.resolve(api.as_ref(), accepted).await;
        self.finish_resolution(had_pending, result)
    }

    /// Close the proposal without choosing; treated as a decline
    pub async fn dismiss_proposal(&mut self) -> Result<Resolution, SessionError> {
        let had_pending = self.confirmation.has_pending();
        let api = Arc::clone(&self.api);
        let result = self.confirmation.dismiss(api.as_ref()).await;
        self.finish_resolution(had_pending, result)
    }

    fn finish_resolution(
        &self,
        had_pending: bool,
        result: Result<Resolution, ResolutionError>,
    ) -> Result<Resolution, SessionError> {
        if had_pending {
            self.emit(SessionEvent::ProposalCleared);
        }
        Ok(result?)
    }

    /// Clear the conversation on the backend, then locally
    ///
    /// If the backend call fails nothing local changes.
    pub async fn clear(&mut self) -> Result<(), SessionError> {
        let chat_id = self
            .identity
            .as_ref()
            .map(|i| i.user_id.clone())
            .ok_or(ConnectionError::NoIdentity)?;

        if let Err(err) = self.api.clear_history(&chat_id).await {
            tracing::error!(%chat_id, "clear history failed: {:#}", err);
            return Err(SessionError::ClearFailed(format!("{:#}", err)));
        }

        self.reset_conversation();
        Ok(())
    }

    fn reset_conversation(&mut self) {
        self.accumulator.reset();
        if self.confirmation.discard().is_some() {
            self.emit(SessionEvent::ProposalCleared);
        }
        self.update_log(MessageLog::new());
    }

    fn update_log(&mut self, next: MessageLog) {
        self.log = next;
        self.emit(SessionEvent::LogChanged(self.log.clone()));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}
