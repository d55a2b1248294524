//! # idrelay
//!
//! Process wiring for the identity request relay: configuration loading,
//! logging and the HTTP/WebSocket server built on [`idrelay_core`] and
//! [`idrelay_http`].

pub mod cli;
pub mod error;

// Re-exports
pub use error::*;
pub use idrelay_core as core;
pub use idrelay_http as http;
