//! Services a session delegates to.

pub mod decoder;
