//! In-memory partitioned broker implementing the channel traits.
//!
//! Used as the reference transport for tests and single-process embeddings:
//! topics are partitioned vectors of records, every consumer group keeps its
//! own cursors, and replay from the earliest offset is always possible
//! because nothing is ever truncated.

use crate::channel::{
    BroadcastChannel, ChannelConsumer, ChannelError, ChannelPublisher, ChannelRecord, PublishAck,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Partitions per topic.
pub const MEMORY_PARTITIONS: usize = 3;

/// Upper bound on records returned by a single poll.
pub const MAX_POLL_RECORDS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredRecord {
    key: Option<String>,
    value: String,
}

#[derive(Debug)]
struct TopicLog {
    name: String,
    partitions: Vec<Mutex<Vec<StoredRecord>>>,
}

impl TopicLog {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            partitions: (0..MEMORY_PARTITIONS).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    fn partition_for(&self, key: Option<&str>) -> usize {
        // Keyless records all land on partition 0 so they stay ordered
        // relative to each other.
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() as usize) % self.partitions.len()
            }
            None => 0,
        }
    }

    fn append(&self, key: Option<&str>, value: &str) -> PublishAck {
        let partition = self.partition_for(key);
        let mut records = self.partitions[partition].lock().expect("topic lock poisoned");
        records.push(StoredRecord {
            key: key.map(str::to_string),
            value: value.to_string(),
        });
        PublishAck {
            partition: partition as u32,
            offset: (records.len() - 1) as u64,
        }
    }

    fn fetch_from(&self, cursors: &mut [usize], limit: usize) -> Vec<ChannelRecord> {
        let mut batch = Vec::new();
        for (partition, cursor) in cursors.iter_mut().enumerate() {
            let records = self.partitions[partition].lock().expect("topic lock poisoned");
            while *cursor < records.len() && batch.len() < limit {
                let stored = &records[*cursor];
                batch.push(ChannelRecord {
                    topic: self.name.clone(),
                    partition: partition as u32,
                    offset: *cursor as u64,
                    key: stored.key.clone(),
                    value: stored.value.clone(),
                });
                *cursor += 1;
            }
            if batch.len() >= limit {
                break;
            }
        }
        batch
    }
}

/// Process-local broker shared by every repository instance under test.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<HashMap<String, Arc<TopicLog>>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Arc<TopicLog> {
        let mut topics = self.topics.lock().expect("broker lock poisoned");
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicLog::new(name)))
            .clone()
    }

    /// Records currently retained for `topic`, across all partitions.
    pub fn record_count(&self, topic: &str) -> usize {
        self.topic(topic)
            .partitions
            .iter()
            .map(|partition| partition.lock().expect("topic lock poisoned").len())
            .sum()
    }
}

impl BroadcastChannel for MemoryBroker {
    fn open_publisher(&self, topic: &str) -> Result<Box<dyn ChannelPublisher>, ChannelError> {
        Ok(Box::new(MemoryPublisher {
            log: self.topic(topic),
            closed: AtomicBool::new(false),
        }))
    }

    fn open_consumer(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn ChannelConsumer>, ChannelError> {
        Ok(Box::new(MemoryConsumer {
            log: self.topic(topic),
            group_id: group_id.to_string(),
            cursors: vec![0; MEMORY_PARTITIONS],
            subscribed: false,
            closed: false,
        }))
    }
}

struct MemoryPublisher {
    log: Arc<TopicLog>,
    closed: AtomicBool,
}

impl ChannelPublisher for MemoryPublisher {
    fn publish(&self, key: Option<&str>, value: &str) -> Result<PublishAck, ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        Ok(self.log.append(key, value))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MemoryConsumer {
    log: Arc<TopicLog>,
    group_id: String,
    cursors: Vec<usize>,
    subscribed: bool,
    closed: bool,
}

impl ChannelConsumer for MemoryConsumer {
    fn subscribe(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.subscribed = true;
        tracing::debug!(topic = %self.log.name, group = %self.group_id, "memory consumer subscribed");
        Ok(())
    }

    fn seek_to_earliest(&mut self) -> Result<(), ChannelError> {
        if !self.subscribed {
            return Err(ChannelError::Transport("consumer is not subscribed".into()));
        }
        for cursor in &mut self.cursors {
            *cursor = 0;
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<ChannelRecord>, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        if !self.subscribed {
            return Err(ChannelError::Transport("consumer is not subscribed".into()));
        }
        let batch = self.log.fetch_from(&mut self.cursors, MAX_POLL_RECORDS);
        if batch.is_empty() && !timeout.is_zero() {
            // Nothing buffered; wait out the poll timeout instead of spinning.
            thread::sleep(timeout);
        }
        Ok(batch)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
