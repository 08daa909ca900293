//! NewCAMD frame layout.
//!
//! ```text
//! wire:       [len:2 BE] [ciphertext:len-8] [iv:8]
//! plaintext:  [msg_id:2] [service_id:2] [reserved:6]
//!             [command:1] [flags:4|length:12] [data] [padding] [checksum:1]
//! ```
//!
//! The plaintext is padded with random bytes so that, with the trailing
//! checksum, it fills whole DES blocks. The checksum makes the XOR of the
//! whole plaintext zero.

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::Message;
use crate::utils::crypto::{generate_iv, KeySchedule, BLOCK_SIZE};
use bytes::{BufMut, BytesMut};

/// Maximum value of the length prefix
pub const MAX_FRAME_LEN: usize = 400;

/// Size of the big-endian length prefix
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Routing header at the start of the plaintext (ids + reserved bytes)
pub const HEADER_LEN: usize = 10;

/// Command byte plus the flags/length field
pub const COMMAND_HEADER_LEN: usize = 3;

/// Largest data length whose frame still fits in [`MAX_FRAME_LEN`]
pub const MAX_DATA_LEN: usize =
    MAX_FRAME_LEN - BLOCK_SIZE - HEADER_LEN - COMMAND_HEADER_LEN - 1;

/// One encrypted frame, without its length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; BLOCK_SIZE],
}

impl Frame {
    /// Value of the length prefix for this frame
    pub fn length_prefix(&self) -> usize {
        self.ciphertext.len() + BLOCK_SIZE
    }

    /// Split a frame body (the `len` bytes after the prefix) into ciphertext and IV.
    ///
    /// # Errors
    /// `OversizeMessage` above 400 bytes, `Framing` unless the ciphertext is a
    /// positive multiple of 8 bytes
    pub fn parse(body: &[u8]) -> Result<Self> {
        validate_length(body.len())?;

        let cipher_len = body.len() - BLOCK_SIZE;
        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&body[cipher_len..]);

        Ok(Self {
            ciphertext: body[..cipher_len].to_vec(),
            iv,
        })
    }

    /// Build, pad, checksum and encrypt `msg` under a fresh random IV.
    ///
    /// # Errors
    /// `OversizeMessage` if the data exceeds [`MAX_DATA_LEN`]
    pub fn seal(msg: &Message, schedule: &KeySchedule) -> Result<Self> {
        let mut plaintext = build_plaintext(msg)?;
        let iv = generate_iv();
        schedule.encrypt_cbc(&mut plaintext, &iv)?;

        Ok(Self {
            ciphertext: plaintext,
            iv,
        })
    }

    /// Decrypt, verify the checksum and parse the message.
    ///
    /// # Errors
    /// `Checksum` if the decrypted bytes do not XOR to zero, `Framing` if the
    /// header or embedded length does not fit
    pub fn open(mut self, schedule: &KeySchedule) -> Result<Message> {
        schedule.decrypt_cbc(&mut self.ciphertext, &self.iv)?;
        parse_plaintext(&self.ciphertext)
    }

    /// Append prefix, ciphertext and IV to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(LENGTH_PREFIX_LEN + self.length_prefix());
        dst.put_u16(self.length_prefix() as u16);
        dst.put_slice(&self.ciphertext);
        dst.put_slice(&self.iv);
    }
}

/// Check a length prefix before any of the body is read.
pub fn validate_length(len: usize) -> Result<()> {
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::OversizeMessage(len));
    }
    if len <= BLOCK_SIZE || (len - BLOCK_SIZE) % BLOCK_SIZE != 0 {
        return Err(ProtocolError::Framing(constants::ERR_CIPHER_LENGTH.into()));
    }
    Ok(())
}

/// XOR of all bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Random padding needed so that `unpadded_len` plus the checksum byte is block aligned
pub fn padding_len(unpadded_len: usize) -> usize {
    (BLOCK_SIZE - (unpadded_len + 1) % BLOCK_SIZE) % BLOCK_SIZE
}

/// Lay out the plaintext for `msg`, including padding and checksum.
pub fn build_plaintext(msg: &Message) -> Result<Vec<u8>> {
    if msg.payload.len() > MAX_DATA_LEN {
        return Err(ProtocolError::OversizeMessage(msg.payload.len()));
    }

    let unpadded = HEADER_LEN + COMMAND_HEADER_LEN + msg.payload.len();
    let padding = padding_len(unpadded);
    let mut buf = Vec::with_capacity(unpadded + padding + 1);

    buf.extend_from_slice(&msg.msg_id.to_be_bytes());
    buf.extend_from_slice(&msg.service_id.to_be_bytes());
    buf.resize(HEADER_LEN, 0);
    buf.extend_from_slice(&msg.section());

    let noise: [u8; BLOCK_SIZE] = rand::random();
    buf.extend_from_slice(&noise[..padding]);

    let sum = checksum(&buf);
    buf.push(sum);

    Ok(buf)
}

/// Parse decrypted plaintext into a message after checking its checksum.
pub fn parse_plaintext(plain: &[u8]) -> Result<Message> {
    if checksum(plain) != 0 {
        return Err(ProtocolError::Checksum);
    }

    if plain.len() < HEADER_LEN + COMMAND_HEADER_LEN {
        return Err(ProtocolError::Framing(constants::ERR_SHORT_HEADER.into()));
    }

    let msg_id = u16::from_be_bytes([plain[0], plain[1]]);
    let service_id = u16::from_be_bytes([plain[2], plain[3]]);

    let section = &plain[HEADER_LEN..];
    let length_field = u16::from_be_bytes([section[1], section[2]]);
    let data_len = usize::from(length_field & 0x0fff);

    let end = COMMAND_HEADER_LEN + data_len;
    if end > section.len() {
        return Err(ProtocolError::Framing(constants::ERR_EMBEDDED_LENGTH.into()));
    }

    Ok(Message {
        command: section[0],
        flags: (length_field >> 12) as u8,
        msg_id,
        service_id,
        payload: section[COMMAND_HEADER_LEN..end].to_vec(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::message::Command;
    use crate::utils::crypto::spread_and_schedule;

    fn schedule() -> KeySchedule {
        spread_and_schedule(&[0x42; 14])
    }

    #[test]
    fn test_max_data_len_fills_frame() {
        assert_eq!(MAX_DATA_LEN, 378);
        let msg = Message::new(Command::KeepAlive, vec![0; MAX_DATA_LEN]);
        let frame = Frame::seal(&msg, &schedule()).unwrap();
        assert_eq!(frame.length_prefix(), MAX_FRAME_LEN);
    }

    #[test]
    fn test_plaintext_is_block_aligned_and_sums_to_zero() {
        for len in 0..40 {
            let msg = Message::new(Command::KeepAlive, vec![0x5a; len]).with_ids(1, 2);
            let plain = build_plaintext(&msg).unwrap();
            assert_eq!(plain.len() % BLOCK_SIZE, 0, "data len {len}");
            assert_eq!(checksum(&plain), 0);
        }
    }

    #[test]
    fn test_plaintext_layout() {
        let msg = Message::new(Command::CardDataRequest, vec![]).with_ids(0x1234, 0xabcd);
        let plain = build_plaintext(&msg).unwrap();
        assert_eq!(&plain[..4], &[0x12, 0x34, 0xab, 0xcd]);
        assert!(plain[4..HEADER_LEN].iter().all(|&b| b == 0));
        assert_eq!(&plain[HEADER_LEN..HEADER_LEN + 3], &[0xe3, 0x00, 0x00]);
        assert_eq!(plain.len(), 16);
    }

    #[test]
    fn test_seal_open_preserves_message() {
        let mut msg = Message::new(0x80u8, (0u8..=200).collect()).with_ids(9, 700);
        msg.flags = 0x3;
        let frame = Frame::seal(&msg, &schedule()).unwrap();
        assert_eq!(frame.open(&schedule()).unwrap(), msg);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let msg = Message::new(Command::KeepAlive, b"ping".to_vec());
        let frame = Frame::seal(&msg, &schedule()).unwrap();
        let other = spread_and_schedule(&[0x24; 14]);
        // A wrong key yields garbage; the checksum catches it except for a
        // 1-in-256 coincidence, which the header check then usually rejects.
        assert!(frame.open(&other).map(|m| m != msg).unwrap_or(true));
    }

    #[test]
    fn test_oversize_data_rejected() {
        let msg = Message::new(Command::KeepAlive, vec![0; MAX_DATA_LEN + 1]);
        assert!(matches!(
            build_plaintext(&msg),
            Err(ProtocolError::OversizeMessage(379))
        ));
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length(16).is_ok());
        assert!(validate_length(400).is_ok());
        assert!(matches!(
            validate_length(401),
            Err(ProtocolError::OversizeMessage(401))
        ));
        assert!(matches!(validate_length(8), Err(ProtocolError::Framing(_))));
        assert!(matches!(validate_length(20), Err(ProtocolError::Framing(_))));
        assert!(matches!(validate_length(0), Err(ProtocolError::Framing(_))));
    }

    #[test]
    fn test_embedded_length_past_frame() {
        let mut plain = vec![0u8; 16];
        plain[HEADER_LEN] = 0xfd;
        plain[HEADER_LEN + 1] = 0x00;
        plain[HEADER_LEN + 2] = 0x10; // claims 16 data bytes, only 3 remain
        let sum = checksum(&plain[..15]);
        plain[15] = sum;
        assert!(matches!(
            parse_plaintext(&plain),
            Err(ProtocolError::Framing(_))
        ));
    }

    #[test]
    fn test_short_plaintext_rejected() {
        let plain = [0u8; 8];
        assert!(matches!(
            parse_plaintext(&plain),
            Err(ProtocolError::Framing(_))
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let msg = Message::new(Command::KeepAlive, vec![1, 2, 3]);
        let mut plain = build_plaintext(&msg).unwrap();
        plain[11] ^= 0x01;
        assert!(matches!(parse_plaintext(&plain), Err(ProtocolError::Checksum)));
    }
}
