//! # Transport Cipher
//!
//! Key scheduling and two-key triple-DES (EDE2) in CBC mode, as used by the
//! NewCAMD transport.
//!
//! 14 bytes of key material are spread into two 8-byte DES keys: every output
//! byte carries 7 key bits in its high bits and an odd-parity bit in bit 0.
//! The two keys form an encrypt-decrypt-encrypt construction
//! (`E(k1) . D(k2) . E(k1)`), run through [`des::TdesEde2`] and the
//! [`cbc`] block mode.

use crate::error::{constants, ProtocolError, Result};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyInit};
use des::TdesEde2;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of NewCAMD key material in bytes
pub const KEY_MATERIAL_LEN: usize = 14;

/// DES block size; also the IV length
pub const BLOCK_SIZE: usize = 8;

/// Site-provisioned or login-derived key material.
///
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; KEY_MATERIAL_LEN]);

impl KeyMaterial {
    pub fn new(bytes: [u8; KEY_MATERIAL_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_MATERIAL_LEN] {
        &self.0
    }

    /// XOR `bytes` into the key, wrapping around every 14 bytes.
    ///
    /// Used both for the challenge mix (14 bytes, one pass) and for the
    /// post-login password mix (arbitrary length).
    pub fn xor_cyclic(&mut self, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.0[i % KEY_MATERIAL_LEN] ^= b;
        }
    }

    /// Copy of this key with `bytes` mixed in.
    pub fn mixed_with(&self, bytes: &[u8]) -> Self {
        let mut mixed = self.clone();
        mixed.xor_cyclic(bytes);
        mixed
    }

    /// Derive the EDE2 schedule for this key.
    pub fn schedule(&self) -> KeySchedule {
        spread_and_schedule(&self.0)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// Spread 14 bytes of key material into two 8-byte DES key blocks.
///
/// Each output byte takes 7 consecutive bits of the input; bit 0 is left
/// clear for parity.
pub fn des_key_spread(key: &[u8; KEY_MATERIAL_LEN]) -> [u8; 16] {
    let mut spread = [0u8; 16];

    for (half, out) in spread.chunks_exact_mut(8).enumerate() {
        let k = &key[half * 7..half * 7 + 7];

        out[0] = k[0] & 0xfe;
        for i in 1..7 {
            out[i] = ((k[i - 1] << (8 - i)) | (k[i] >> i)) & 0xfe;
        }
        out[7] = k[6] << 1;
    }

    spread
}

/// Force odd parity on every byte of a DES key block.
pub fn set_odd_parity(block: &mut [u8]) {
    for b in block.iter_mut() {
        let high = *b & 0xfe;
        *b = if high.count_ones() % 2 == 0 {
            high | 1
        } else {
            high
        };
    }
}

/// Spread `key`, fix parity and build the EDE2 schedule.
pub fn spread_and_schedule(key: &[u8; KEY_MATERIAL_LEN]) -> KeySchedule {
    let mut spread = des_key_spread(key);
    set_odd_parity(&mut spread);

    let schedule = KeySchedule {
        cipher: TdesEde2::new(GenericArray::from_slice(&spread)),
    };

    spread.zeroize();
    schedule
}

/// Expanded two-key triple-DES schedule.
#[derive(Clone)]
pub struct KeySchedule {
    cipher: TdesEde2,
}

impl KeySchedule {
    /// Encrypt `buf` in place in CBC mode.
    ///
    /// # Errors
    /// Returns `ProtocolError::Framing` if `buf` is not a multiple of 8 bytes
    pub fn encrypt_cbc(&self, buf: &mut [u8], iv: &[u8; BLOCK_SIZE]) -> Result<()> {
        check_block_aligned(buf)?;

        let len = buf.len();
        cbc::Encryptor::<TdesEde2>::inner_iv_init(self.cipher.clone(), GenericArray::from_slice(iv))
            .encrypt_padded_mut::<NoPadding>(buf, len)
            .map_err(|_| ProtocolError::Framing(constants::ERR_CIPHER_LENGTH.into()))?;
        Ok(())
    }

    /// Decrypt `buf` in place in CBC mode.
    ///
    /// # Errors
    /// Returns `ProtocolError::Framing` if `buf` is not a multiple of 8 bytes
    pub fn decrypt_cbc(&self, buf: &mut [u8], iv: &[u8; BLOCK_SIZE]) -> Result<()> {
        check_block_aligned(buf)?;

        cbc::Decryptor::<TdesEde2>::inner_iv_init(self.cipher.clone(), GenericArray::from_slice(iv))
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| ProtocolError::Framing(constants::ERR_CIPHER_LENGTH.into()))?;
        Ok(())
    }
}

impl fmt::Debug for KeySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySchedule(..)")
    }
}

fn check_block_aligned(buf: &[u8]) -> Result<()> {
    if buf.len() % BLOCK_SIZE != 0 {
        return Err(ProtocolError::Framing(constants::ERR_CIPHER_LENGTH.into()));
    }
    Ok(())
}

/// Generate a fresh random IV
pub fn generate_iv() -> [u8; BLOCK_SIZE] {
    rand::random()
}
