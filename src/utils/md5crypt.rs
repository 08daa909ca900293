//! MD5-crypt (`$1$`) password digests.
//!
//! NewCAMD clients never send the clear password: the LOGIN password field
//! carries `crypt(password, "$1$abcdefgh$")`. The server computes the same
//! digest from its configured password once per session and compares.

use crate::error::{ProtocolError, Result};
use pwhash::HashSetup;

/// Salt used by NewCAMD for login digests
pub const NEWCAMD_SALT: &str = "abcdefgh";

/// Compute `crypt(password, "$1$<salt>$")`.
///
/// # Errors
/// `ConfigError` if `salt` is not a valid crypt salt
pub fn md5_crypt(password: &[u8], salt: &str) -> Result<String> {
    let setup = HashSetup {
        salt: Some(salt),
        rounds: None,
    };
    pwhash::md5_crypt::hash_with(setup, password)
        .map_err(|e| ProtocolError::ConfigError(format!("md5-crypt failed: {e}")))
}

/// Digest of `password` with the fixed NewCAMD salt.
pub fn newcamd_digest(password: &str) -> Result<String> {
    md5_crypt(password.as_bytes(), NEWCAMD_SALT)
}
