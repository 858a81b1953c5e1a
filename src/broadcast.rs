use crate::action::CacheAction;
use crate::channel::{ChannelError, ChannelPublisher};
use thiserror::Error;
use tracing::debug;

/// Publishes mutation actions to the shared log.
///
/// Every publish is synchronous: the call returns only once the channel has
/// acknowledged the write, so callers never report success for a mutation
/// that other instances might not observe. Failures are wrapped and
/// surfaced, never retried here; retrying is the caller's decision.
pub struct ActionBroadcaster {
    topic: String,
    publisher: Box<dyn ChannelPublisher>,
}

impl ActionBroadcaster {
    pub fn new(topic: impl Into<String>, publisher: Box<dyn ChannelPublisher>) -> Self {
        Self {
            topic: topic.into(),
            publisher,
        }
    }

    /// Serializes `action` as a record (key = identifier, value = wire tag)
    /// and publishes it, blocking until acknowledged.
    pub fn broadcast(&self, action: CacheAction, id: Option<&str>) -> Result<(), BroadcastError> {
        debug!(topic = %self.topic, %action, key = ?id, "broadcasting action");
        self.publisher
            .publish(id, action.as_wire())
            .map_err(|source| BroadcastError {
                action,
                id: id.map(str::to_string),
                source,
            })?;
        Ok(())
    }

    /// Releases the underlying publisher handle.
    pub fn close(&self) {
        self.publisher.close();
    }
}

/// A mutation broadcast that the channel did not acknowledge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to broadcast {action} action for key {id:?}: {source}")]
pub struct BroadcastError {
    pub action: CacheAction,
    pub id: Option<String>,
    #[source]
    pub source: ChannelError,
}
