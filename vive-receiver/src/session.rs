//! Receiver session: the state that outlives individual connections (running frame
//! counter, publish queue) and the per-frame fan-out to sinks.

use tracing::{info, warn};
use vive_core::Frame;

use crate::sink::{
    frame_json, summarize, PublishQueue, PublishStats, Publisher, DEFAULT_PUBLISH_QUEUE,
};

pub struct ReceiverSession<P> {
    frames_seen: u64,
    print_every: u64,
    publisher: Option<PublishQueue<P>>,
    /// Counters of a publisher that has been closed.
    closed: PublishStats,
}

impl<P: Publisher + 'static> ReceiverSession<P> {
    /// Console summary every `print_every` frames; 0 disables it.
    pub fn new(print_every: u64) -> Self {
        Self {
            frames_seen: 0,
            print_every,
            publisher: None,
            closed: PublishStats::default(),
        }
    }

    /// Also publish every frame as JSON on `channel`. Spawns the publish task, so this
    /// must run inside a tokio runtime.
    pub fn with_publisher(self, publisher: P, channel: impl Into<String>) -> Self {
        self.with_publish_queue(publisher, channel, DEFAULT_PUBLISH_QUEUE)
    }

    /// `with_publisher` with an explicit queue depth.
    pub fn with_publish_queue(
        mut self,
        publisher: P,
        channel: impl Into<String>,
        capacity: usize,
    ) -> Self {
        self.publisher = Some(PublishQueue::spawn(publisher, channel, capacity));
        self
    }

    /// Frames dispatched since startup, across all connections.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn publish_stats(&self) -> PublishStats {
        self.publisher.as_ref().map_or(self.closed, PublishQueue::stats)
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_stats().failures
    }

    pub fn publish_dropped(&self) -> u64 {
        self.publish_stats().dropped
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    /// Fan one decoded frame out to the sinks. Never waits on a sink.
    pub fn dispatch(&mut self, frame: &Frame) {
        self.frames_seen += 1;
        if self.print_every > 0 && self.frames_seen % self.print_every == 0 {
            info!("{}", summarize(frame, self.frames_seen));
        }
        let Some(queue) = &mut self.publisher else {
            return;
        };
        match frame_json(frame) {
            Ok(json) => {
                queue.offer(json);
            }
            Err(e) => warn!(error = %e, "cannot serialize frame"),
        }
    }

    /// Drain the publish queue and hand the publisher back.
    pub async fn close_publisher(&mut self) -> Option<P> {
        let (publisher, stats) = self.publisher.take()?.close().await;
        self.closed = stats;
        publisher
    }
}
