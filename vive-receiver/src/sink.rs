//! Frame sinks: operator console summary and pub/sub publish of the JSON form.
//!
//! Publishing runs on its own task behind a bounded queue, so a slow or hung pub/sub server
//! never holds up the read loop. When the queue is full the frame is dropped for that sink.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vive_core::Frame;

/// Downstream pub/sub channel. Fire-and-forget from the receiver's point of view: a
/// failure is reported, never retried for the same frame.
pub trait Publisher: Send {
    fn publish(
        &mut self,
        channel: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// JSON object `{"timestamp_ns": .., "trackers": [{"role", "px", .., "qz"}, ..]}`.
pub fn frame_json(frame: &Frame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// One-line console summary: `[n] ts=.. trackers=k role: pos=(x,y,z), ..`.
pub fn summarize(frame: &Frame, index: u64) -> String {
    let mut line = format!(
        "[{}] ts={} trackers={}",
        index,
        frame.timestamp_ns,
        frame.trackers.len()
    );
    for (i, t) in frame.trackers.iter().enumerate() {
        let sep = if i == 0 { " " } else { ", " };
        let _ = write!(line, "{}{}: pos=({:.3},{:.3},{:.3})", sep, t.role, t.px, t.py, t.pz);
    }
    line
}

pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_CHANNEL: &str = "vive/trackers";
/// Frames buffered for the publish task before new ones are dropped.
pub const DEFAULT_PUBLISH_QUEUE: usize = 256;
const REDIS_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis pub/sub publisher. Connects on first use and again on the publish after any
/// failure.
pub struct RedisPublisher {
    addr: String,
    conn: Option<MultiplexedConnection>,
    io_timeout: Duration,
}

impl RedisPublisher {
    /// `addr` is `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: None,
            io_timeout: REDIS_IO_TIMEOUT,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Connect now rather than on the first publish.
    pub async fn connect(&mut self) -> Result<(), SinkError> {
        self.open().await.map(drop)
    }

    async fn open(&mut self) -> Result<MultiplexedConnection, SinkError> {
        let client = redis::Client::open(format!("redis://{}/", self.addr))?;
        let conn = with_timeout(self.io_timeout, client.get_multiplexed_async_connection()).await?;
        info!(addr = %self.addr, "connected to redis");
        self.conn = Some(conn.clone());
        Ok(conn)
    }

    async fn publish_once(&mut self, channel: &str, payload: &str) -> Result<(), SinkError> {
        let mut conn = match &self.conn {
            Some(conn) => conn.clone(),
            None => self.open().await?,
        };
        let receivers: i64 = with_timeout(self.io_timeout, conn.publish(channel, payload)).await?;
        debug!(receivers, "published");
        Ok(())
    }
}

impl Publisher for RedisPublisher {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<(), SinkError> {
        let result = self.publish_once(channel, payload).await;
        if result.is_err() {
            self.conn = None;
        }
        result
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = redis::RedisResult<T>>,
) -> Result<T, SinkError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(r) => Ok(r?),
        Err(_) => Err(SinkError::TimedOut(limit)),
    }
}

/// Publish outcome counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Publish attempts that failed.
    pub failures: u64,
    /// Frames never queued: queue full or publish task gone.
    pub dropped: u64,
}

/// Handle to a publisher running on its own task.
pub struct PublishQueue<P> {
    tx: mpsc::Sender<String>,
    failures: Arc<AtomicU64>,
    dropped: u64,
    task: JoinHandle<P>,
}

impl<P: Publisher + 'static> PublishQueue<P> {
    /// Spawn the publish task on the current tokio runtime.
    pub fn spawn(publisher: P, channel: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let failures = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(publish_loop(publisher, channel.into(), rx, failures.clone()));
        Self {
            tx,
            failures,
            dropped: 0,
            task,
        }
    }

    /// Queue one payload without waiting. Returns false if it was dropped.
    pub fn offer(&mut self, payload: String) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(e) => {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 100 == 0 {
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "queue full",
                        mpsc::error::TrySendError::Closed(_) => "publish task gone",
                    };
                    warn!(dropped = self.dropped, reason, "frame not published");
                }
                false
            }
        }
    }

    pub fn stats(&self) -> PublishStats {
        PublishStats {
            failures: self.failures.load(Ordering::Relaxed),
            dropped: self.dropped,
        }
    }

    /// Stop accepting frames, wait for the queued ones to be attempted, and hand the
    /// publisher back with the final counters. The publisher is `None` if the task panicked.
    pub async fn close(self) -> (Option<P>, PublishStats) {
        let Self {
            tx,
            failures,
            dropped,
            task,
        } = self;
        drop(tx);
        let publisher = match task.await {
            Ok(publisher) => Some(publisher),
            Err(e) => {
                warn!(error = %e, "publish task failed");
                None
            }
        };
        let stats = PublishStats {
            failures: failures.load(Ordering::Relaxed),
            dropped,
        };
        (publisher, stats)
    }
}

async fn publish_loop<P: Publisher>(
    mut publisher: P,
    channel: String,
    mut rx: mpsc::Receiver<String>,
    failures: Arc<AtomicU64>,
) -> P {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = publisher.publish(&channel, &payload).await {
            let n = failures.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(error = %e, failures = n, "publish failed; continuing");
        }
    }
    publisher
}
