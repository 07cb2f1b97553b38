//! Chat session orchestration
//!
//! [`SessionController`] ties the connection, the message log and the
//! confirmation handshake together for one identity at a time.

pub mod controller;
pub mod events;

pub use controller::{SessionController, SessionSnapshot};
pub use events::{SessionEvent, SessionEventReceiver, SessionEventSender};
