//! # Core Wire Components
//!
//! Frame layout and the encrypting codec.
//!
//! ## Components
//! - **Frame**: plaintext layout, padding, XOR checksum, EDE2-CBC sealing
//! - **Codec**: Tokio codec for length-prefixed frames over byte streams
//!
//! ## Wire Format
//! ```text
//! [Length(2)] [Ciphertext(N*8)] [IV(8)]
//! ```
//!
//! ## Security
//! - Maximum frame size: 400 bytes, checked before the body is read
//! - Fresh random IV and padding per frame
//! - Checksum verified before any header field is trusted

pub mod codec;
pub mod frame;
