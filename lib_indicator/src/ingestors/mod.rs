//! # Data Ingestors Module
//!
//! Streaming clients that feed live changes into the engine.
//!
//! ## Contained Modules:
//! - **`frame`**: decoding of inbound socket frames.
//! - **`front_wss`**: the authenticated, self-reconnecting WebSocket session.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Inbound frame decoding.
pub mod frame;
/// The WebSocket session for front changes.
pub mod front_wss;

// --- Public API Re-exports ---
pub use frame::{decode_frame, DecodeError, Frame};
pub use front_wss::{FrontStreamConfig, FrontStreamSession, SessionState, StreamError};
