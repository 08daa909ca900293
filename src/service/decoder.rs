//! Entitlement decoder collaborator.
//!
//! ECM/EMM sections received from clients are resolved into control words by
//! an external decoder. The session engine only needs the trait below; the
//! decoder may block, so sessions call it from a blocking task.

use crate::error::{ProtocolError, Result};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a control word (even + odd key)
pub const CONTROL_WORD_LEN: usize = 16;

/// 16-byte control word. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ControlWord([u8; CONTROL_WORD_LEN]);

impl ControlWord {
    pub fn new(bytes: [u8; CONTROL_WORD_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CONTROL_WORD_LEN] {
        &self.0
    }
}

impl fmt::Debug for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ControlWord(..)")
    }
}

/// Resolves an ECM/EMM section into a control word.
///
/// `request` is the raw section: table id, 12-bit length, body.
/// Implementations report failure with `ProtocolError::DecodeFailure`.
pub trait EntitlementDecoder: Send + Sync {
    fn decode_entitlement(&self, request: &[u8]) -> Result<ControlWord>;
}

impl<F> EntitlementDecoder for F
where
    F: Fn(&[u8]) -> Result<ControlWord> + Send + Sync,
{
    fn decode_entitlement(&self, request: &[u8]) -> Result<ControlWord> {
        self(request)
    }
}

/// Decoder used when no key source is wired in; every request is "not found".
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDecoder;

impl EntitlementDecoder for UnavailableDecoder {
    fn decode_entitlement(&self, _request: &[u8]) -> Result<ControlWord> {
        Err(ProtocolError::DecodeFailure(
            "no entitlement decoder configured".into(),
        ))
    }
}
