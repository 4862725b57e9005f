//! Vive receiver: accept one producer at a time, decode frames, fan them out to sinks.

pub mod config;
pub mod server;
pub mod session;
pub mod sink;

pub use server::{ConnectionEnd, Receiver, ServerConfig, DEFAULT_COOLDOWN};
pub use session::ReceiverSession;
pub use sink::{
    frame_json, summarize, PublishQueue, PublishStats, Publisher, RedisPublisher, SinkError,
    DEFAULT_CHANNEL, DEFAULT_PUBLISH_QUEUE, DEFAULT_REDIS_PORT,
};
