//! NewCAMD messages and command codes.
//!
//! A [`Message`] is the decrypted content of one frame: the routing ids from
//! the frame header plus the command section (command byte, 12-bit length,
//! data).

use crate::error::{constants, ProtocolError, Result};
use crate::service::decoder::ControlWord;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// First command code of the NewCAMD session range
pub const FIRST_COMMAND: u8 = 0xe0;

/// Data bytes carried by an entitlement reply
pub const ENTITLEMENT_REPLY_LEN: usize = 32;

/// Conditional-access system id announced in card data
pub const EMULATED_CAID: u16 = 0x5601;

/// Command codes understood by the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Command {
    EcmRequest = 0x80,
    EmmRequest = 0x81,
    ClientLogin = 0xe0,
    ClientLoginAck = 0xe1,
    ClientLoginNak = 0xe2,
    CardDataRequest = 0xe3,
    CardData = 0xe4,
    ServerName = 0xe5,
    ServerNameAck = 0xe6,
    ServerNameNak = 0xe7,
    ServerLogin = 0xe8,
    ServerLoginAck = 0xe9,
    ServerLoginNak = 0xea,
    Admin = 0xeb,
    AdminAck = 0xec,
    AdminLogin = 0xed,
    AdminLoginAck = 0xee,
    AdminLoginNak = 0xef,
    AdminCommand = 0xf0,
    AdminCommandAck = 0xf1,
    AdminCommandNak = 0xf2,
    KeepAlive = 0xfd,
}

/// One decoded NewCAMD message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw command byte; may be outside [`Command`]
    pub command: u8,
    /// Upper nibble of the 16-bit length field, carried through untouched
    pub flags: u8,
    pub msg_id: u16,
    pub service_id: u16,
    /// Data following the 3-byte command header
    pub payload: Vec<u8>,
}

impl Message {
    /// New message with zero ids and flags
    pub fn new(command: impl Into<u8>, payload: Vec<u8>) -> Self {
        Self {
            command: command.into(),
            flags: 0,
            msg_id: 0,
            service_id: 0,
            payload,
        }
    }

    pub fn with_ids(mut self, msg_id: u16, service_id: u16) -> Self {
        self.msg_id = msg_id;
        self.service_id = service_id;
        self
    }

    /// Typed command, if the code is known
    pub fn kind(&self) -> Option<Command> {
        Command::try_from(self.command).ok()
    }

    /// Response to this message: same ids, new command and data.
    pub fn reply(&self, command: impl Into<u8>, payload: Vec<u8>) -> Self {
        Self::new(command, payload).with_ids(self.msg_id, self.service_id)
    }

    /// The command section as it appears on the wire:
    /// command byte, flags/length (12 bits), data.
    ///
    /// For ECM/EMM requests this is the raw table section handed to the
    /// entitlement decoder.
    pub fn section(&self) -> Vec<u8> {
        let len = self.payload.len() & 0x0fff;
        let mut out = Vec::with_capacity(3 + self.payload.len());
        out.push(self.command);
        out.push(((self.flags & 0x0f) << 4) | ((len >> 8) as u8 & 0x0f));
        out.push((len & 0xff) as u8);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Reply to an ECM/EMM request.
    ///
    /// A control word fills the first 16 of 32 data bytes. Without one the
    /// reply has no data, which clients read as "not found".
    pub fn entitlement_reply(&self, control_word: Option<&ControlWord>) -> Self {
        let payload = match control_word {
            Some(cw) => {
                let mut data = vec![0u8; ENTITLEMENT_REPLY_LEN];
                data[..cw.as_bytes().len()].copy_from_slice(cw.as_bytes());
                data
            }
            None => Vec::new(),
        };
        self.reply(self.command, payload)
    }
}

/// Provider record inside a card data announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub id: [u8; 3],
    pub shared_address: [u8; 8],
}

/// Card capability announcement sent in reply to `CardDataRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardData {
    pub caid: u16,
    pub unique_address: [u8; 8],
    pub providers: Vec<Provider>,
}

impl CardData {
    /// The static card this relay emulates: one provider, no addresses.
    pub fn emulated() -> Self {
        Self {
            caid: EMULATED_CAID,
            unique_address: [0; 8],
            providers: vec![Provider {
                id: [0x00, 0x00, 0x01],
                shared_address: [0; 8],
            }],
        }
    }

    /// Layout: admin flag, CAID, UA, provider count, then id + SA per provider.
    ///
    /// The count is one byte; providers past the 255th are left out so the
    /// count always matches the entries written.
    pub fn to_payload(&self) -> Vec<u8> {
        let count = u8::try_from(self.providers.len()).unwrap_or(u8::MAX);
        let mut out = Vec::with_capacity(12 + usize::from(count) * 11);
        out.push(0);
        out.extend_from_slice(&self.caid.to_be_bytes());
        out.extend_from_slice(&self.unique_address);
        out.push(count);
        for provider in self.providers.iter().take(usize::from(count)) {
            out.extend_from_slice(&provider.id);
            out.extend_from_slice(&provider.shared_address);
        }
        out
    }
}

/// Credentials carried by a `ClientLogin` message.
///
/// The password field holds the client's crypt digest, not the clear text.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: Vec<u8>,
}

impl LoginRequest {
    /// Parse two back-to-back NUL-terminated strings.
    ///
    /// The password terminator is optional; the field then runs to the end
    /// of the payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let user_end = payload
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ProtocolError::Framing(constants::ERR_LOGIN_NO_USER.into()))?;

        let rest = &payload[user_end + 1..];
        let pass_end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());

        Ok(Self {
            username: String::from_utf8_lossy(&payload[..user_end]).into_owned(),
            password: rest[..pass_end].to_vec(),
        })
    }

    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        out.extend_from_slice(self.username.as_bytes());
        out.push(0);
        out.extend_from_slice(&self.password);
        out.push(0);
        out
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
