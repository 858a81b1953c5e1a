//! Broadcast-channel abstraction the repository replicates through.
//!
//! The channel is an append-only, partitioned, replayable, multi-subscriber
//! record stream. The repository treats it as opaque: it publishes mutation
//! records synchronously and replays them through a consumer handle. Broker
//! internals, retention, and wire protocol belong to the concrete
//! implementation behind these traits.

pub mod memory;

use std::time::Duration;
use thiserror::Error;

/// A record fetched from the channel during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    /// Identifier the mutation applies to; absent for keyless actions.
    pub key: Option<String>,
    /// Action wire tag.
    pub value: String,
}

/// Durability acknowledgment returned by a synchronous publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishAck {
    pub partition: u32,
    pub offset: u64,
}

/// Transport-level failure surfaced by channel handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("unknown topic \"{0}\"")]
    UnknownTopic(String),
    #[error("channel handle is closed")]
    Closed,
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Synchronous publish side of the channel. `publish` blocks until the log
/// acknowledges the write; buffering without acknowledgment is not enough.
/// `close` must be idempotent.
pub trait ChannelPublisher: Send + Sync {
    fn publish(&self, key: Option<&str>, value: &str) -> Result<PublishAck, ChannelError>;
    fn close(&self);
}

/// Replay side of the channel, owned by exactly one poller thread.
/// `close` must be idempotent.
pub trait ChannelConsumer: Send {
    /// Attaches the consumer under its group identity.
    fn subscribe(&mut self) -> Result<(), ChannelError>;
    /// Rewinds every assigned partition to the earliest retained offset.
    fn seek_to_earliest(&mut self) -> Result<(), ChannelError>;
    /// Fetches a bounded batch, waiting up to `timeout` when none is ready.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<ChannelRecord>, ChannelError>;
    fn close(&mut self);
}

/// Factory for per-repository channel handles.
pub trait BroadcastChannel: Send + Sync {
    fn open_publisher(&self, topic: &str) -> Result<Box<dyn ChannelPublisher>, ChannelError>;
    fn open_consumer(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn ChannelConsumer>, ChannelError>;
}
