//! # NewCAMD Session Protocol
//!
//! Message types, the login handshake and the per-connection state machine.
//!
//! ## Components
//! - **Message**: command codes, card data and login payloads
//! - **Handshake**: challenge bootstrap, credential check, re-keying
//! - **Dispatcher**: which commands each session state accepts
//! - **Session**: server-side receive / dispatch / reply loop
//! - **Client**: the client half of the handshake

pub mod client;
pub mod dispatcher;
pub mod handshake;
pub mod message;
pub mod session;
