//! Shared wire types for the Diwan voice assistant.
//!
//! This crate holds the JSON messages exchanged with the browser over the
//! signaling WebSocket and the session-description shapes shared between the
//! signaling layer and the peer-connection layer.
//!
//! Nothing in here performs I/O. Keeping the protocol in its own crate lets
//! `diwan-rtc` and `diwan-server` agree on one definition without depending
//! on each other.

pub mod messages;
pub mod signaling;

pub use messages::{IncomingMessage, OutgoingMessage};
pub use signaling::{CandidateInit, SdpType, SessionDescription};

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "diwan";
