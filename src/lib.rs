//! notechat: streaming chat client for a notes service
//!
//! This library provides:
//! - A chat connection per signed-in user, with stale-traffic filtering
//! - Reconciliation of streamed reply fragments into a message log
//! - The confirm/decline handshake for notes proposed by the assistant
//! - A terminal client driving all of the above

pub mod config;
pub mod core;
pub mod session;
pub mod transport;

pub use config::Config;
pub use session::{SessionController, SessionEvent, SessionSnapshot};
