//! Transport layer: chat connection, wire protocol, REST and terminal

pub mod cli;
pub mod connection;
pub mod http;
pub mod protocol;
pub mod ws;

pub use connection::{
    ConnectRequest, ConnectionEnvelope, ConnectionEvent, ConnectionEvents, ConnectionLink,
    ConnectionManager, Connector, EventSink,
};
pub use http::{HttpNotesApi, Note};
pub use protocol::{InboundEvent, OutboundEvent};
pub use ws::WsConnector;
