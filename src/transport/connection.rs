//! Connection Manager - one chat connection per active identity
//!
//! The manager owns the lifecycle (Connecting -> Open -> Closing -> Closed)
//! and the outbound path. Inbound traffic is delivered on the single
//! [`ConnectionEvents`] receiver handed out by [`ConnectionManager::new`].
//!
//! Every connection gets a generation number. Events are tagged with it, and
//! [`ConnectionManager::accept`] drops anything from a superseded connection,
//! so frames still in flight for a previous identity never reach the session.
//!
//! There is no reconnect: a closed connection stays closed until the next
//! [`ConnectionManager::open`].

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

use crate::config::Config;
use crate::core::{ConnectionError, ConnectionState, Identity};

use super::protocol::OutboundEvent;

/// What a transport reports about its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake finished; frames may be sent
    Opened,
    /// One inbound text frame
    Frame(String),
    /// Terminal: the connection is gone
    Closed { reason: String },
}

/// A [`ConnectionEvent`] tagged with the connection that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEnvelope {
    pub generation: u64,
    pub event: ConnectionEvent,
}

pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEnvelope>;

/// Handle a transport uses to report events for one connection
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ConnectionEnvelope>,
}

impl EventSink {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event; silently dropped once the session is gone
    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(ConnectionEnvelope {
            generation: self.generation,
            event,
        });
    }
}

/// Parameters for opening one connection
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Fully built URL, identity key and credential included
    pub url: Url,
    /// Inbound messages above this size are refused and end the connection
    pub max_frame_bytes: usize,
}

/// Live connection as seen by the manager
pub trait ConnectionLink: Send {
    /// Queue one text frame for sending
    fn send(&self, frame: String) -> Result<()>;

    /// Start closing. The transport reports `Closed` when done.
    fn close(&mut self);
}

/// Opens connections. The WebSocket implementation lives in `transport::ws`.
pub trait Connector: Send + Sync {
    /// Start connecting and return immediately
    ///
    /// Progress (`Opened`, frames, `Closed`) is reported through `events`.
    /// An `Err` means the attempt could not even be started.
    fn connect(&self, request: ConnectRequest, events: EventSink)
        -> Result<Box<dyn ConnectionLink>>;
}

struct ActiveConnection {
    generation: u64,
    user_id: String,
    state: ConnectionState,
    link: Option<Box<dyn ConnectionLink>>,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    config: Config,
    events_tx: mpsc::UnboundedSender<ConnectionEnvelope>,
    next_generation: u64,
    active: Option<ActiveConnection>,
}

impl ConnectionManager {
    /// Create a manager and the receiver all of its connections report to
    pub fn new(connector: Arc<dyn Connector>, config: Config) -> (Self, ConnectionEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            connector,
            config,
            events_tx,
            next_generation: 1,
            active: None,
        };
        (manager, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map(|conn| conn.state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Identity key of the current connection, if any
    pub fn user_id(&self) -> Option<&str> {
        self.active.as_ref().map(|conn| conn.user_id.as_str())
    }

    /// Open a connection for `identity`, closing any previous one first
    ///
    /// Failures do not propagate: the connection lands in `Closed` and a
    /// `Closed` event is queued for the session to pick up.
    pub fn open(&mut self, identity: &Identity) {
        self.close();

        let generation = self.next_generation;
        self.next_generation += 1;
        let sink = EventSink {
            generation,
            tx: self.events_tx.clone(),
        };

        let mut active = ActiveConnection {
            generation,
            user_id: identity.user_id.clone(),
            state: ConnectionState::Connecting,
            link: None,
        };

        let attempt = self
            .config
            .server
            .chat_socket_url(identity)
            .map(|url| ConnectRequest {
                url,
                max_frame_bytes: self.config.chat.max_frame_bytes,
            })
            .and_then(|request| self.connector.connect(request, sink.clone()));

        match attempt {
            Ok(link) => {
                tracing::info!(user_id = %identity.user_id, generation, "opening chat connection");
                active.link = Some(link);
            }
            Err(err) => {
                tracing::warn!(user_id = %identity.user_id, generation, "chat connection failed: {:#}", err);
                active.state = ConnectionState::Closed;
                sink.emit(ConnectionEvent::Closed {
                    reason: format!("{:#}", err),
                });
            }
        }
        self.active = Some(active);
    }

    /// Serialize and send one outbound frame; only allowed while open
    pub fn send(&self, event: &OutboundEvent) -> Result<(), ConnectionError> {
        let conn = self.active.as_ref().ok_or(ConnectionError::NoIdentity)?;
        if conn.state != ConnectionState::Open {
            return Err(ConnectionError::NotOpen { state: conn.state });
        }
        let link = conn
            .link
            .as_ref()
            .ok_or(ConnectionError::NotOpen { state: conn.state })?;

        let frame = event.encode()?;
        tracing::debug!(generation = conn.generation, bytes = frame.len(), "sending frame");
        link.send(frame)
            .map_err(|e| ConnectionError::Transport(format!("{:#}", e)))
    }

    /// Release the current connection. Safe to call any number of times.
    pub fn close(&mut self) {
        let Some(conn) = self.active.as_mut() else {
            return;
        };
        if matches!(conn.state, ConnectionState::Closing | ConnectionState::Closed) {
            return;
        }
        tracing::info!(user_id = %conn.user_id, generation = conn.generation, "closing chat connection");
        conn.state = ConnectionState::Closing;
        if let Some(link) = conn.link.as_mut() {
            link.close();
        }
    }

    /// Forget the current connection entirely, closing it first
    pub fn detach(&mut self) {
        self.close();
        self.active = None;
    }

    /// Filter an event from the shared receiver and apply it to the state
    /// machine
    ///
    /// Returns `None` for events from superseded connections.
    pub fn accept(&mut self, envelope: ConnectionEnvelope) -> Option<ConnectionEvent> {
        let conn = match self.active.as_mut() {
            Some(conn) if conn.generation == envelope.generation => conn,
            _ => {
                tracing::debug!(generation = envelope.generation, "dropping event from stale connection");
                return None;
            }
        };

        match &envelope.event {
            ConnectionEvent::Opened => {
                if conn.state != ConnectionState::Connecting {
                    return None;
                }
                tracing::info!(generation = conn.generation, "chat connection open");
                conn.state = ConnectionState::Open;
            }
            ConnectionEvent::Frame(_) => {
                if conn.state == ConnectionState::Closed {
                    return None;
                }
            }
            ConnectionEvent::Closed { reason } => {
                // A failed open is already Closed with no link
                let failed_open = conn.state == ConnectionState::Closed && conn.link.is_none();
                if !failed_open {
                    tracing::info!(generation = conn.generation, %reason, "chat connection closed");
                    conn.state = ConnectionState::Closed;
                    conn.link = None;
                }
            }
        }
        Some(envelope.event)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}
