//! Producer loop: persistent outbound connection to the receiver.
//!
//! ```text
//! Disconnected -> Connecting -> Streaming -> Disconnected -> (reconnect delay) -> Connecting
//!                                                 any state -> Shutdown (stop signal)
//! ```
//!
//! Any connect or write failure drops the socket and retries after the reconnect delay,
//! forever. Frames in flight when a connection drops are lost.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use vive_core::{encode_payload, write_frame, ShutdownSignal, TransportError};

use crate::source::{build_frame, wall_clock_ns, PoseSource, Tick};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Receiver address, `host:port`.
    pub addr: String,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    /// Log one line per sent frame.
    pub verbose: bool,
}

impl ProducerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Disconnected,
    Connecting,
    Streaming,
    Shutdown,
}

/// Why `Producer::run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Stop signal observed.
    Shutdown,
    /// Upstream source reported the end of its session.
    SourceEnded,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerStats {
    pub connect_attempts: u64,
    pub connections: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
}

enum StreamEnd {
    Shutdown,
    SourceEnded,
    SendFailed(TransportError),
}

pub struct Producer<S> {
    config: ProducerConfig,
    source: S,
    state: ProducerState,
    stats: ProducerStats,
    last_timestamp_ns: u64,
}

impl<S: PoseSource + Send> Producer<S> {
    pub fn new(config: ProducerConfig, source: S) -> Self {
        Self {
            config,
            source,
            state: ProducerState::Disconnected,
            stats: ProducerStats::default(),
            last_timestamp_ns: 0,
        }
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats
    }

    /// Give the source back, e.g. to close a capture session explicitly.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Run until the stop signal fires or the source ends its session.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> ProducerExit {
        let addr = self.config.addr.clone();
        let delay = self.config.reconnect_delay;
        loop {
            if shutdown.is_triggered() {
                return self.stop();
            }
            self.state = ProducerState::Connecting;
            self.stats.connect_attempts += 1;
            info!(%addr, attempt = self.stats.connect_attempts, "connecting to receiver");
            let connected = tokio::select! {
                _ = shutdown.wait() => return self.stop(),
                r = connect(&addr, self.config.connect_timeout) => r,
            };
            match connected {
                Ok(stream) => {
                    self.stats.connections += 1;
                    self.state = ProducerState::Streaming;
                    info!(%addr, "connection established, streaming poses");
                    match self.stream_frames(stream, &mut shutdown).await {
                        StreamEnd::Shutdown => return self.stop(),
                        StreamEnd::SourceEnded => {
                            info!("pose source ended its session");
                            self.state = ProducerState::Disconnected;
                            return ProducerExit::SourceEnded;
                        }
                        StreamEnd::SendFailed(e) => {
                            self.stats.send_failures += 1;
                            warn!(error = %e, "socket send failed; reconnecting");
                        }
                    }
                }
                Err(e) => {
                    warn!(%addr, error = %e, "connection failed; retrying in {:?}", delay);
                }
            }
            self.state = ProducerState::Disconnected;
            tokio::select! {
                _ = shutdown.wait() => return self.stop(),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn stop(&mut self) -> ProducerExit {
        self.state = ProducerState::Shutdown;
        info!(
            frames_sent = self.stats.frames_sent,
            connections = self.stats.connections,
            "producer stopped"
        );
        ProducerExit::Shutdown
    }

    async fn stream_frames(&mut self, mut stream: TcpStream, shutdown: &mut ShutdownSignal) -> StreamEnd {
        loop {
            let tick = tokio::select! {
                _ = shutdown.wait() => return StreamEnd::Shutdown,
                tick = self.source.next_tick() => tick,
            };
            let samples = match tick {
                Tick::Samples(samples) => samples,
                Tick::SessionEnded => {
                    let _ = stream.shutdown().await;
                    return StreamEnd::SourceEnded;
                }
            };
            let frame = build_frame(samples, self.next_timestamp());
            if frame.is_empty() {
                debug!("no trackers captured this tick");
                continue;
            }
            let payload = encode_payload(&frame);
            let written = tokio::select! {
                _ = shutdown.wait() => return StreamEnd::Shutdown,
                r = write_frame(&mut stream, &payload) => r,
            };
            if let Err(e) = written {
                return StreamEnd::SendFailed(e);
            }
            self.stats.frames_sent += 1;
            if self.config.verbose {
                info!(
                    "sent {} trackers at {} ns first={}",
                    frame.trackers.len(),
                    frame.timestamp_ns,
                    frame.trackers[0].role
                );
            }
        }
    }

    /// Wall-clock timestamp, held non-decreasing if the clock steps back.
    fn next_timestamp(&mut self) -> u64 {
        self.last_timestamp_ns = self.last_timestamp_ns.max(wall_clock_ns());
        self.last_timestamp_ns
    }
}

/// TCP connect bounded by `timeout`, with Nagle disabled on success.
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream, TransportError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::TimedOut)??;
    stream.set_nodelay(true)?;
    Ok(stream)
}
