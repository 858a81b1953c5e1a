//! Log-replicated idempotent repository.
//!
//! A bounded local cache of previously seen identifiers, kept consistent
//! across independent process instances by broadcasting every mutation over
//! a shared append-only, partitioned log. Instances never coordinate
//! directly: each one replays the same ordered stream, including its own
//! writes, from the earliest retained offset on every start.

pub mod action;
pub mod broadcast;
pub mod cache;
pub mod channel;
pub mod config;
pub mod poller;
pub mod repository;

pub use action::CacheAction;
pub use broadcast::{ActionBroadcaster, BroadcastError};
pub use cache::{CacheStore, DEFAULT_CACHE_CAPACITY};
pub use channel::memory::{MemoryBroker, MAX_POLL_RECORDS, MEMORY_PARTITIONS};
pub use channel::{
    BroadcastChannel, ChannelConsumer, ChannelError, ChannelPublisher, ChannelRecord, PublishAck,
};
pub use config::{
    ConfigError, RepositoryConfig, DEFAULT_POLL_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
    DEFAULT_WARMUP_TIMEOUT_MS,
};
pub use poller::{PollerHandle, PollerState, ReplicationPoller};
pub use repository::{DedupRepository, RepositoryDiagnostics, RepositoryError};
