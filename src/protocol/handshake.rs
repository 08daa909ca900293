//! NewCAMD login handshake.
//!
//! 1. On connect the server sends a 14-byte random challenge in the clear.
//! 2. Both sides key the transport with `key_material XOR challenge`.
//! 3. The client sends `ClientLogin` (username, crypt digest of its password).
//! 4. The server answers `ClientLoginAck` under the challenge key, or
//!    `ClientLoginNak` and hangs up.
//! 5. After the ACK both sides mix the digest into the *original* key
//!    material (`key[i % 14] ^= digest[i]`) and re-key.
//!
//! Handshake state is owned per session; nothing here is shared between
//! connections.

use crate::error::{ProtocolError, Result};
use crate::protocol::message::LoginRequest;
use crate::utils::crypto::{KeyMaterial, KeySchedule, KEY_MATERIAL_LEN};
use crate::utils::md5crypt::newcamd_digest;
use rand::RngCore;
use std::fmt;
use tracing::{debug, instrument, warn};

/// Length of the bootstrap challenge; one byte per key byte
pub const CHALLENGE_LEN: usize = KEY_MATERIAL_LEN;

/// Account a session authenticates against.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub key: KeyMaterial,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Generate a bootstrap challenge from the thread-local CSPRNG
pub fn generate_challenge() -> [u8; CHALLENGE_LEN] {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::rng().fill_bytes(&mut challenge);
    challenge
}

/// Schedule protecting the login exchange
pub fn initial_schedule(key: &KeyMaterial, challenge: &[u8; CHALLENGE_LEN]) -> KeySchedule {
    key.mixed_with(challenge).schedule()
}

/// Key material after a successful login with `password_field`
pub fn session_key(key: &KeyMaterial, password_field: &[u8]) -> KeyMaterial {
    key.mixed_with(password_field)
}

/// Build the `ClientLogin` payload a client sends for `password`.
pub fn client_login_request(username: &str, password: &str) -> Result<LoginRequest> {
    Ok(LoginRequest {
        username: username.to_string(),
        password: newcamd_digest(password)?.into_bytes(),
    })
}

/// Server-side handshake state - lives for the whole session
pub struct ServerHandshakeState {
    key_material: KeyMaterial,
    expected_digest: String,
}

impl ServerHandshakeState {
    /// Take a copy of the site key and compute the expected login digest.
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub fn new(credentials: &Credentials) -> Result<Self> {
        debug!("Computing login digest");
        Ok(Self {
            key_material: credentials.key.clone(),
            expected_digest: newcamd_digest(&credentials.password)?,
        })
    }

    /// Current (pre- or post-login) key material
    pub fn key_material(&self) -> &KeyMaterial {
        &self.key_material
    }

    /// Check a login against the expected digest.
    ///
    /// # Errors
    /// `ProtocolError::Auth` on mismatch
    pub fn verify_login(&self, login: &LoginRequest) -> Result<()> {
        if digests_match(self.expected_digest.as_bytes(), &login.password) {
            Ok(())
        } else {
            warn!(username = %login.username, "Password incorrect");
            Err(ProtocolError::Auth)
        }
    }

    /// Mix the accepted password field into the key material and return the
    /// schedule for all messages after the ACK.
    pub fn complete_login(&mut self, login: &LoginRequest) -> KeySchedule {
        self.key_material.xor_cyclic(&login.password);
        self.key_material.schedule()
    }
}

impl fmt::Debug for ServerHandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerHandshakeState(..)")
    }
}

/// Length-checked comparison without an early exit on the first differing byte
fn digests_match(expected: &[u8], supplied: &[u8]) -> bool {
    expected.len() == supplied.len()
        && expected
            .iter()
            .zip(supplied)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            username: "user".into(),
            password: "pass".into(),
            key: KeyMaterial::new([
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10, 0x11, 0x12, 0x13, 0x14,
            ]),
        }
    }

    #[test]
    fn test_challenges_are_unique() {
        let a = generate_challenge();
        let b = generate_challenge();
        let c = generate_challenge();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_verify_login() {
        let state = ServerHandshakeState::new(&credentials()).unwrap();
        assert!(state
            .verify_login(&client_login_request("user", "pass").unwrap())
            .is_ok());
        assert!(matches!(
            state.verify_login(&client_login_request("user", "wrong").unwrap()),
            Err(ProtocolError::Auth)
        ));

        // A clear-text password is not a digest.
        let clear = LoginRequest {
            username: "user".into(),
            password: b"pass".to_vec(),
        };
        assert!(state.verify_login(&clear).is_err());
    }

    #[test]
    fn test_complete_login_matches_client_derivation() {
        let creds = credentials();
        let login = client_login_request("user", "pass").unwrap();
        let mut state = ServerHandshakeState::new(&creds).unwrap();
        state.complete_login(&login);

        let client_key = session_key(&creds.key, &login.password);
        assert_eq!(state.key_material(), &client_key);
        assert_ne!(state.key_material(), &creds.key);
    }

    #[test]
    fn test_digests_match() {
        assert!(digests_match(b"abc", b"abc"));
        assert!(!digests_match(b"abc", b"abd"));
        assert!(!digests_match(b"abc", b"ab"));
        assert!(!digests_match(b"", b"a"));
    }
}
