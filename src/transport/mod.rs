//! # Transport Layer
//!
//! NewCAMD runs over plain TCP; confidentiality comes from the session's
//! own triple-DES framing.

pub mod tcp;

pub use tcp::Server;
