use crate::core::frame::{validate_length, Frame, LENGTH_PREFIX_LEN};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::Message;
use crate::utils::crypto::KeySchedule;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Encrypting NewCAMD codec.
///
/// Holds the key schedule of its connection. [`NewcamdCodec::rekey`] takes
/// effect for the next frame encoded or decoded; frames already written to
/// the sink keep the schedule they were sealed with.
#[derive(Debug, Clone)]
pub struct NewcamdCodec {
    schedule: KeySchedule,
}

impl NewcamdCodec {
    pub fn new(schedule: KeySchedule) -> Self {
        Self { schedule }
    }

    /// Replace the key schedule for all following frames.
    pub fn rekey(&mut self, schedule: KeySchedule) {
        self.schedule = schedule;
    }
}

impl Decoder for NewcamdCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        // Oversize and misaligned prefixes fail before the body is awaited.
        let len = usize::from(u16::from_be_bytes([src[0], src[1]]));
        validate_length(len)?;

        if src.len() < LENGTH_PREFIX_LEN + len {
            src.reserve(LENGTH_PREFIX_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let body = src.split_to(len);
        trace!(len, "Frame received");

        Frame::parse(&body)?.open(&self.schedule).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(buf)? {
            Some(msg) => Ok(Some(msg)),
            None if buf.is_empty() => Ok(None),
            None => Err(ProtocolError::Framing(
                constants::ERR_TRUNCATED_FRAME.into(),
            )),
        }
    }
}

impl Encoder<Message> for NewcamdCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let frame = Frame::seal(&item, &self.schedule)?;
        trace!(len = frame.length_prefix(), command = item.command, "Frame sealed");
        frame.write_to(dst);
        Ok(())
    }
}
