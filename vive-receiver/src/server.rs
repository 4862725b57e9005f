//! Receiver loop: one listening socket, one producer served at a time.
//!
//! ```text
//! bind -> accept -> serve (read frame, decode, dispatch)* -> close -> cooldown -> accept ...
//! ```
//!
//! A connection ends on end of stream, a transport error, or a malformed payload. The byte
//! stream cannot be resynchronized after a bad frame, so a malformed message closes the
//! connection rather than skipping ahead. Frames from successive connections never
//! interleave: the next producer is accepted only after the previous one is closed and the
//! cooldown elapsed.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tracing::{info, warn};
use vive_core::{
    decode_payload, read_frame_timeout, MalformedMessage, ShutdownSignal, TransportError,
    DEFAULT_MAX_FRAME_LEN,
};

use crate::session::ReceiverSession;
use crate::sink::Publisher;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);
/// Further producers wait in the kernel backlog while one is served.
const LISTEN_BACKLOG: u32 = 1;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, `host:port`.
    pub bind: String,
    pub max_frame_len: u32,
    /// Per-frame read deadline; `None` waits for the peer indefinitely.
    pub read_timeout: Option<Duration>,
    /// Pause between closing one connection and accepting the next.
    pub cooldown: Duration,
}

impl ServerConfig {
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            read_timeout: None,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// How a served connection ended.
#[derive(Debug)]
pub enum ConnectionEnd {
    PeerClosed,
    Transport(TransportError),
    Malformed(MalformedMessage),
    Shutdown,
}

pub struct Receiver {
    listener: TcpListener,
    config: ServerConfig,
    connections_served: u64,
}

impl Receiver {
    /// Bind the listening socket with address reuse. Failure here is a startup error.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let addr = lookup_host(&config.bind).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no address for {}", config.bind),
            )
        })?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            config,
            connections_served: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connections_served(&self) -> u64 {
        self.connections_served
    }

    /// Accept and serve producers until the stop signal fires.
    pub async fn run<P: Publisher + 'static>(
        &mut self,
        session: &mut ReceiverSession<P>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            if shutdown.is_triggered() {
                break;
            }
            let accepted = tokio::select! {
                _ = shutdown.wait() => break,
                r = self.listener.accept() => r,
            };
            match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "Client connected");
                    let end = self.serve(stream, session, &mut shutdown).await;
                    self.connections_served += 1;
                    match end {
                        ConnectionEnd::PeerClosed => info!(%peer, "Connection closed by peer"),
                        ConnectionEnd::Transport(e) => {
                            warn!(%peer, error = %e, "Connection dropped")
                        }
                        ConnectionEnd::Malformed(e) => {
                            warn!(%peer, error = %e, "Closing connection after malformed frame")
                        }
                        ConnectionEnd::Shutdown => break,
                    }
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.config.cooldown) => {}
            }
        }
        info!(
            frames = session.frames_seen(),
            connections = self.connections_served,
            "receiver stopped"
        );
    }

    /// Read, decode and dispatch frames until the connection ends. The stream is dropped
    /// (closed) on return.
    async fn serve<P: Publisher + 'static>(
        &self,
        mut stream: TcpStream,
        session: &mut ReceiverSession<P>,
        shutdown: &mut ShutdownSignal,
    ) -> ConnectionEnd {
        loop {
            let read = tokio::select! {
                _ = shutdown.wait() => return ConnectionEnd::Shutdown,
                r = read_frame_timeout(&mut stream, self.config.max_frame_len, self.config.read_timeout) => r,
            };
            let payload = match read {
                Ok(Some(payload)) => payload,
                Ok(None) => return ConnectionEnd::PeerClosed,
                Err(e) => return ConnectionEnd::Transport(e),
            };
            let frame = match decode_payload(&payload) {
                Ok(frame) => frame,
                Err(e) => return ConnectionEnd::Malformed(e),
            };
            session.dispatch(&frame);
        }
    }
}
