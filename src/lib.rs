//! # newcamd-relay
//!
//! Server side of the NewCAMD conditional-access protocol.
//!
//! Clients connect over TCP, receive a 14-byte challenge, log in with an
//! md5-crypt digest of their password and then exchange triple-DES encrypted
//! frames: card data queries, keepalives, and ECM/EMM sections that are
//! handed to an [`EntitlementDecoder`](service::decoder::EntitlementDecoder).
//!
//! ## Layout
//! - [`core`]: frame layout and the `tokio-util` codec
//! - [`protocol`]: messages, handshake, dispatcher, session, client
//! - [`transport`]: TCP accept loop
//! - [`service`]: the entitlement decoder seam
//! - [`utils`]: DES key handling, md5-crypt, logging setup

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::CamdConfig;
pub use error::{ProtocolError, Result};
pub use protocol::client::NewcamdClient;
pub use protocol::handshake::Credentials;
pub use protocol::message::{Command, Message};
pub use protocol::session::Session;
pub use service::decoder::{ControlWord, EntitlementDecoder};
pub use transport::Server;
