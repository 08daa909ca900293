//! Client side of a NewCAMD session.
//!
//! Mirrors the server handshake: read the challenge, log in under the
//! challenge key, then re-key with the login digest. Used by the integration
//! tests and to check running servers.

use crate::core::codec::NewcamdCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::{
    client_login_request, initial_schedule, session_key, CHALLENGE_LEN,
};
use crate::protocol::message::{Command, Message};
use crate::utils::crypto::KeyMaterial;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

pub struct NewcamdClient<T> {
    framed: Framed<T, NewcamdCodec>,
    key_material: KeyMaterial,
    next_msg_id: u16,
}

impl<T> NewcamdClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the server challenge and key the connection for login.
    ///
    /// # Errors
    /// `Io` if the connection ends before the full challenge arrives
    #[instrument(skip_all)]
    pub async fn connect(mut io: T, key_material: KeyMaterial) -> Result<Self> {
        let mut challenge = [0u8; CHALLENGE_LEN];
        io.read_exact(&mut challenge).await?;
        debug!("Challenge received");

        let schedule = initial_schedule(&key_material, &challenge);
        Ok(Self {
            framed: Framed::new(io, NewcamdCodec::new(schedule)),
            key_material,
            next_msg_id: 0,
        })
    }

    /// Log in and switch to the session key.
    ///
    /// # Errors
    /// `Auth` if the server answers with a NAK, `ProtocolViolation` on any
    /// other reply
    #[instrument(skip(self, password))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let login = client_login_request(username, password)?;
        self.send(Message::new(Command::ClientLogin, login.to_payload()))
            .await?;

        let reply = self.receive().await?;
        match reply.kind() {
            Some(Command::ClientLoginAck) => {
                self.key_material = session_key(&self.key_material, &login.password);
                self.framed.codec_mut().rekey(self.key_material.schedule());
                debug!("Login accepted");
                Ok(())
            }
            Some(Command::ClientLoginNak) => Err(ProtocolError::Auth),
            _ => Err(ProtocolError::ProtocolViolation(
                constants::ERR_UNEXPECTED_ACK.into(),
            )),
        }
    }

    pub async fn send(&mut self, msg: Message) -> Result<()> {
        self.framed.send(msg).await
    }

    pub async fn receive(&mut self) -> Result<Message> {
        self.framed
            .next()
            .await
            .ok_or(ProtocolError::ConnectionClosed)?
    }

    /// Send `msg` with the next message id and wait for the reply.
    pub async fn request(&mut self, mut msg: Message) -> Result<Message> {
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        msg.msg_id = self.next_msg_id;
        self.send(msg).await?;
        self.receive().await
    }

    /// Underlying connection, e.g. to inject raw bytes
    pub fn get_mut(&mut self) -> &mut T {
        self.framed.get_mut()
    }
}
