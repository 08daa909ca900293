//! # TCP Listener
//!
//! Accepts NewCAMD clients and runs one [`Session`] task per connection.
//! Sessions share nothing except the account credentials and the
//! entitlement decoder.

use crate::config::CamdConfig;
use crate::error::Result;
use crate::protocol::handshake::Credentials;
use crate::protocol::session::Session;
use crate::service::decoder::EntitlementDecoder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};

pub struct Server {
    listener: TcpListener,
    credentials: Arc<Credentials>,
    decoder: Arc<dyn EntitlementDecoder>,
    max_connections: usize,
    shutdown_timeout: Duration,
    active_connections: Arc<Mutex<usize>>,
}

impl Server {
    /// Bind the configured address.
    ///
    /// # Errors
    /// `ConfigError` for a bad account key, `Io` if the address cannot be bound
    #[instrument(skip_all, fields(address = %config.server.address))]
    pub async fn bind(config: &CamdConfig, decoder: Arc<dyn EntitlementDecoder>) -> Result<Self> {
        let credentials = Arc::new(config.account.credentials()?);
        let listener = TcpListener::bind(&config.server.address).await?;
        info!(address = %listener.local_addr()?, "Listening");

        Ok(Self {
            listener,
            credentials,
            decoder,
            max_connections: config.server.max_connections,
            shutdown_timeout: config.server.shutdown_timeout,
            active_connections: Arc::new(Mutex::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of sessions currently running
    pub async fn active_connections(&self) -> usize {
        *self.active_connections.lock().await
    }

    /// Serve until CTRL+C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Serve until `shutdown_rx` fires, then wait for open sessions.
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    self.drain().await;
                    return Ok(());
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => self.admit(stream, peer).await,
                        Err(e) => error!(error = %e, "Error accepting connection"),
                    }
                }
            }
        }
    }

    async fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        {
            let mut count = self.active_connections.lock().await;
            if *count >= self.max_connections {
                warn!(%peer, limit = self.max_connections, "Connection limit reached, rejecting");
                return;
            }
            *count += 1;
        }

        let credentials = Arc::clone(&self.credentials);
        let decoder = Arc::clone(&self.decoder);
        let active_connections = Arc::clone(&self.active_connections);

        tokio::spawn(async move {
            info!(%peer, "Client connected");
            if let Err(e) = serve_connection(stream, &credentials, decoder).await {
                debug!(%peer, error = %e, "Session ended with error");
            }

            let mut count = active_connections.lock().await;
            *count = count.saturating_sub(1);
        });
    }

    async fn drain(&self) {
        let timeout = tokio::time::sleep(self.shutdown_timeout);
        tokio::pin!(timeout);

        loop {
            let connections = *self.active_connections.lock().await;
            if connections == 0 {
                info!("All connections closed, shutting down");
                return;
            }

            tokio::select! {
                _ = &mut timeout => {
                    warn!(connections, "Shutdown timeout reached, forcing exit");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    debug!(connections, "Waiting for connections to close");
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    credentials: &Credentials,
    decoder: Arc<dyn EntitlementDecoder>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut session = Session::bootstrap(stream, credentials, decoder).await?;
    session.run().await
}
