use crate::action::CacheAction;
use crate::broadcast::{ActionBroadcaster, BroadcastError};
use crate::cache::CacheStore;
use crate::channel::{BroadcastChannel, ChannelError};
use crate::config::{ConfigError, RepositoryConfig};
use crate::poller::{PollerHandle, ReplicationPoller};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Idempotent repository replicated through a shared broadcast log.
///
/// Instances sharing a topic converge on the same membership set by
/// replaying the same ordered mutation stream, including their own writes:
/// the facade never mutates the local cache directly, it only broadcasts,
/// and the replication poller is the single apply path. An `add` that
/// returns `true` therefore means "durably broadcast", not "already visible
/// locally"; a `contains` immediately afterwards may still say `false`
/// until the record is replayed.
pub struct DedupRepository {
    config: RepositoryConfig,
    channel: Arc<dyn BroadcastChannel>,
    duplicate_count: AtomicU64,
    state: RwLock<State>,
}

enum State {
    Idle,
    Running(Active),
}

struct Active {
    cache: CacheStore,
    broadcaster: ActionBroadcaster,
    poller: PollerHandle,
    thread: Option<JoinHandle<()>>,
}

impl DedupRepository {
    /// Validates the config and builds a stopped repository bound to the
    /// given channel. Nothing touches the transport until `start`.
    pub fn new(
        config: RepositoryConfig,
        channel: Arc<dyn BroadcastChannel>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            channel,
            duplicate_count: AtomicU64::new(0),
            state: RwLock::new(State::Idle),
        })
    }

    /// Opens the transports, spawns the replication poller under a fresh
    /// random consumer identity, and blocks up to the warm-up timeout while
    /// the poller replays the topic history. A warm-up timeout is not an
    /// error: the repository proceeds degraded and duplicates may go
    /// undetected until replay catches up. Concurrent readers are served
    /// against the warming cache during the wait rather than blocked.
    pub fn start(&self) -> Result<(), RepositoryError> {
        let handle = {
            let mut state = self.state.write().expect("repository lock poisoned");
            if matches!(*state, State::Running(_)) {
                return Err(RepositoryError::AlreadyStarted);
            }

            // Every instance controls its own offsets, so the group identity
            // is ephemeral: full replay on every start, never a resumed
            // cursor.
            let group_id = format!("dedulog-{}", Uuid::new_v4());
            debug!(topic = %self.config.topic, group = %group_id, "creating replication consumer");

            let publisher = self.channel.open_publisher(&self.config.topic)?;
            let consumer = match self.channel.open_consumer(&self.config.topic, &group_id) {
                Ok(consumer) => consumer,
                Err(err) => {
                    publisher.close();
                    return Err(err.into());
                }
            };
            let cache = CacheStore::new(self.config.cache_capacity);
            let (poller, handle) =
                ReplicationPoller::new(consumer, cache.clone(), self.config.poll_timeout());
            let thread = match thread::Builder::new()
                .name(format!("dedulog-poller-{}", self.config.topic))
                .spawn(move || poller.run())
            {
                Ok(thread) => thread,
                Err(err) => {
                    // The consumer is released by the dropped poller.
                    publisher.close();
                    return Err(RepositoryError::Spawn(err.to_string()));
                }
            };

            *state = State::Running(Active {
                cache,
                broadcaster: ActionBroadcaster::new(self.config.topic.clone(), publisher),
                poller: handle.clone(),
                thread: Some(thread),
            });
            handle
        };

        // Wait outside the lock so readers can observe the warming state.
        info!(topic = %self.config.topic, "warming up cache");
        if handle.await_warmup(self.config.warmup_timeout()) {
            info!(topic = %self.config.topic, "cache warm-up complete");
        } else {
            warn!(
                topic = %self.config.topic,
                "timed out waiting for cache warm-up; proceeding, duplicate records may not be detected"
            );
        }
        Ok(())
    }

    /// Signals the poller, waits up to the shutdown timeout for its
    /// acknowledgment, and releases the transports. The publisher is closed
    /// regardless of whether the poller acknowledged; the consumer is
    /// released by the poller's own exit path. Stopping an idle repository
    /// is a no-op.
    pub fn stop(&self) {
        // Tolerates a poisoned lock so that stop-on-drop never double
        // panics; a poisoned facade still gets its poller signalled.
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let State::Running(mut active) = std::mem::replace(&mut *state, State::Idle) else {
            return;
        };
        active.poller.request_stop();
        if active.poller.await_shutdown(self.config.shutdown_timeout()) {
            if let Some(thread) = active.thread.take() {
                let _ = thread.join();
            }
        } else {
            warn!(
                topic = %self.config.topic,
                "timed out waiting for replication poller shutdown; releasing transports anyway"
            );
        }
        active.broadcaster.close();
        info!(topic = %self.config.topic, "repository stopped");
    }

    /// Records `id` as seen. Returns `Ok(false)` without broadcasting when
    /// the identifier is already present locally; otherwise broadcasts an
    /// add action and returns `Ok(true)` once the log has acknowledged it.
    pub fn add(&self, id: &str) -> Result<bool, RepositoryError> {
        let state = self.state.read().expect("repository lock poisoned");
        let active = state.active()?;
        if active.cache.contains_key(id) {
            self.duplicate_count.fetch_add(1, Ordering::SeqCst);
            return Ok(false);
        }
        active.broadcaster.broadcast(CacheAction::Add, Some(id))?;
        Ok(true)
    }

    /// Pure local read; never broadcasts. Counts a duplicate on hit.
    pub fn contains(&self, id: &str) -> bool {
        let state = self.state.read().expect("repository lock poisoned");
        let Ok(active) = state.active() else {
            return false;
        };
        let present = active.cache.contains_key(id);
        if present {
            self.duplicate_count.fetch_add(1, Ordering::SeqCst);
        }
        present
    }

    /// Broadcasts a remove action. Always `Ok(true)` on a successful
    /// publish, whether or not the identifier was present.
    pub fn remove(&self, id: &str) -> Result<bool, RepositoryError> {
        let state = self.state.read().expect("repository lock poisoned");
        state
            .active()?
            .broadcaster
            .broadcast(CacheAction::Remove, Some(id))?;
        Ok(true)
    }

    /// Broadcasts a clear action; every instance wipes its cache on replay.
    pub fn clear(&self) -> Result<(), RepositoryError> {
        let state = self.state.read().expect("repository lock poisoned");
        state.active()?.broadcaster.broadcast(CacheAction::Clear, None)?;
        Ok(())
    }

    /// Confirmation is not tracked by this design.
    pub fn confirm(&self, _id: &str) -> bool {
        true
    }

    /// Times a duplicate identifier was observed by `add` or `contains`.
    pub fn duplicate_count(&self) -> u64 {
        self.duplicate_count.load(Ordering::SeqCst)
    }

    /// Whether the replication loop is live. `false` before `start`, after
    /// `stop`, and after a protocol-violation fail-stop.
    pub fn poller_running(&self) -> bool {
        let state = self.state.read().expect("repository lock poisoned");
        match &*state {
            State::Running(active) => active.poller.is_running(),
            State::Idle => false,
        }
    }

    /// Read-only management snapshot.
    pub fn diagnostics(&self) -> RepositoryDiagnostics {
        let state = self.state.read().expect("repository lock poisoned");
        let (started, poller_running, warmed_up, polls_total, records_applied) = match &*state {
            State::Running(active) => (
                true,
                active.poller.is_running(),
                active.poller.warmed_up(),
                active.poller.polls_total(),
                active.poller.records_applied(),
            ),
            State::Idle => (false, false, false, 0, 0),
        };
        RepositoryDiagnostics {
            started,
            poller_running,
            warmed_up,
            polls_total,
            records_applied,
            duplicate_count: self.duplicate_count(),
        }
    }
}

impl State {
    fn active(&self) -> Result<&Active, RepositoryError> {
        match self {
            State::Running(active) => Ok(active),
            State::Idle => Err(RepositoryError::NotStarted),
        }
    }
}

impl Drop for DedupRepository {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Point-in-time diagnostics exposed to management surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepositoryDiagnostics {
    pub started: bool,
    pub poller_running: bool,
    pub warmed_up: bool,
    pub polls_total: u64,
    pub records_applied: u64,
    pub duplicate_count: u64,
}

/// Failures surfaced to repository callers. Everything else (warm-up and
/// shutdown timeouts, protocol violations) degrades observably through logs
/// and diagnostics instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("repository has not been started")]
    NotStarted,
    #[error("repository is already started")]
    AlreadyStarted,
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
    #[error("failed to spawn replication poller: {0}")]
    Spawn(String),
}
