//! Per-connection NewCAMD session.
//!
//! A [`Session`] owns its connection, its key material and its codec. It is
//! driven one message at a time: receive, route through the
//! [`Dispatcher`], reply, and only then receive again.

use crate::core::codec::NewcamdCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, Route, SessionState};
use crate::protocol::handshake::{
    generate_challenge, initial_schedule, Credentials, ServerHandshakeState,
};
use crate::protocol::message::{CardData, Command, LoginRequest, Message};
use crate::service::decoder::EntitlementDecoder;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

pub struct Session<T> {
    framed: Framed<T, NewcamdCodec>,
    handshake: ServerHandshakeState,
    state: SessionState,
    dispatcher: Dispatcher,
    decoder: Arc<dyn EntitlementDecoder>,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send the challenge and prepare the login key.
    ///
    /// # Errors
    /// Returns `ProtocolError::Io` if the challenge cannot be written,
    /// `ConfigError` if the login digest cannot be computed
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn bootstrap(
        mut io: T,
        credentials: &Credentials,
        decoder: Arc<dyn EntitlementDecoder>,
    ) -> Result<Self> {
        let handshake = ServerHandshakeState::new(credentials)?;

        let challenge = generate_challenge();
        io.write_all(&challenge).await?;
        io.flush().await?;

        let schedule = initial_schedule(handshake.key_material(), &challenge);
        debug!("Challenge sent");

        Ok(Self {
            framed: Framed::new(io, NewcamdCodec::new(schedule)),
            handshake,
            state: SessionState::Unauthenticated,
            dispatcher: Dispatcher::new(),
            decoder,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Receive and decrypt the next message.
    ///
    /// # Errors
    /// `ConnectionClosed` on a clean end of stream between frames; framing,
    /// checksum and I/O errors otherwise
    pub async fn receive(&mut self) -> Result<Message> {
        self.framed
            .next()
            .await
            .ok_or(ProtocolError::ConnectionClosed)?
    }

    /// Encrypt and send `msg` under the current schedule.
    pub async fn send(&mut self, msg: Message) -> Result<()> {
        self.framed.send(msg).await
    }

    /// Receive one message and fully process it.
    ///
    /// Any fatal error moves the session to `Closed`.
    pub async fn process_next(&mut self) -> Result<()> {
        let outcome = match self.receive().await {
            Ok(msg) => self.dispatch(msg).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            if e.is_fatal() {
                self.state = SessionState::Closed;
            }
        }
        outcome
    }

    /// Drive the session until the peer disconnects or an error closes it.
    ///
    /// A clean disconnect returns `Ok(())`. The session is `Closed` afterwards.
    #[instrument(skip_all)]
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.process_next().await {
                Ok(()) => {}
                Err(ProtocolError::ConnectionClosed) => {
                    info!("Connection closed by peer");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, state = %self.state, "Closing connection");
                    return Err(e);
                }
            }
        }
    }

    async fn dispatch(&mut self, msg: Message) -> Result<()> {
        let route = self.dispatcher.route(self.state, msg.command)?;
        debug!(?route, command = msg.command, msg_id = msg.msg_id, "Dispatching");

        match route {
            Route::Login => self.handle_login(&msg).await,
            Route::CardData => {
                let reply = msg.reply(Command::CardData, CardData::emulated().to_payload());
                self.send(reply).await
            }
            Route::KeepAlive => self.send(msg).await,
            Route::Entitlement => self.handle_entitlement(&msg).await,
        }
    }

    async fn handle_login(&mut self, msg: &Message) -> Result<()> {
        let login = LoginRequest::parse(&msg.payload)?;

        if let Err(e) = self.handshake.verify_login(&login) {
            self.send(Message::new(Command::ClientLoginNak, Vec::new()))
                .await?;
            return Err(e);
        }

        // The ACK goes out under the challenge key; the new key starts after it.
        self.send(Message::new(Command::ClientLoginAck, Vec::new()))
            .await?;
        let schedule = self.handshake.complete_login(&login);
        self.framed.codec_mut().rekey(schedule);
        self.state = SessionState::Authenticated;

        info!(username = %login.username, "Client logged in");
        Ok(())
    }

    async fn handle_entitlement(&mut self, msg: &Message) -> Result<()> {
        let section = msg.section();
        let decoder = Arc::clone(&self.decoder);

        let outcome = tokio::task::spawn_blocking(move || decoder.decode_entitlement(&section))
            .await
            .unwrap_or_else(|_| {
                Err(ProtocolError::DecodeFailure(
                    constants::ERR_DECODER_PANICKED.into(),
                ))
            });

        let reply = match outcome {
            Ok(control_word) => msg.entitlement_reply(Some(&control_word)),
            Err(e) if !e.is_fatal() => {
                debug!(error = %e, command = msg.command, "No control word");
                msg.entitlement_reply(None)
            }
            Err(e) => return Err(e),
        };

        self.send(reply).await
    }
}
