//! # Error Types
//!
//! Error handling for the NewCAMD session engine.
//!
//! Every variant except [`ProtocolError::DecodeFailure`] is fatal for the
//! connection that produced it. Failures never leak into other sessions.
//!
//! ## Error Categories
//! - **I/O Errors**: transport failures while reading or writing frames
//! - **Framing Errors**: malformed length prefix, truncated frame, bad embedded length
//! - **Integrity Errors**: checksum mismatch after decryption
//! - **Authentication Errors**: credential mismatch on login
//! - **Protocol Violations**: command not allowed in the current session state
//!
//! ## Example Usage
//! ```rust
//! use newcamd_relay::error::{ProtocolError, Result};
//!
//! fn check_length(len: usize) -> Result<()> {
//!     if len > 400 {
//!         return Err(ProtocolError::OversizeMessage(len));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_length(401).is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Framing errors
    pub const ERR_TRUNCATED_FRAME: &str = "Connection closed inside a frame";
    pub const ERR_CIPHER_LENGTH: &str = "Ciphertext length is not a positive multiple of 8";
    pub const ERR_SHORT_HEADER: &str = "Decrypted frame shorter than the message header";
    pub const ERR_EMBEDDED_LENGTH: &str = "Embedded message length exceeds the frame";

    /// Login errors
    pub const ERR_LOGIN_NO_USER: &str = "Login payload has no terminated username";
    pub const ERR_UNEXPECTED_ACK: &str = "Expected login acknowledgement";

    /// Decoder errors
    pub const ERR_DECODER_PANICKED: &str = "Entitlement decoder task failed";
}

/// ProtocolError is the primary error type for all session operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Message too large: {0} bytes")]
    OversizeMessage(usize),

    #[error("Checksum failed")]
    Checksum,

    #[error("Authentication failed")]
    Auth,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unable to decode entitlement request: {0}")]
    DecodeFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether the error must terminate the connection that raised it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::DecodeFailure(_))
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
