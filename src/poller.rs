use crate::action::CacheAction;
use crate::cache::CacheStore;
use crate::channel::{ChannelConsumer, ChannelRecord};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Lifecycle of the replication loop, observable through [`PollerHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Created,
    Subscribing,
    Replaying,
    SteadyState,
    Stopping,
    Stopped,
}

/// Single-fire gate with bounded waiting. Fires at most once per lifecycle;
/// later fires are no-ops.
#[derive(Debug, Default)]
struct Latch {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    fn fire(&self) {
        let mut fired = self.fired.lock().expect("latch lock poisoned");
        if !*fired {
            *fired = true;
            self.cond.notify_all();
        }
    }

    fn is_fired(&self) -> bool {
        *self.fired.lock().expect("latch lock poisoned")
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let fired = self.fired.lock().expect("latch lock poisoned");
        let (fired, _) = self
            .cond
            .wait_timeout_while(fired, timeout, |fired| !*fired)
            .expect("latch lock poisoned");
        *fired
    }
}

#[derive(Debug)]
struct PollerShared {
    running: AtomicBool,
    state: Mutex<PollerState>,
    warmup: Latch,
    shutdown: Latch,
    polls_total: AtomicU64,
    records_applied: AtomicU64,
}

/// Handle held by the repository facade to observe and stop the poller.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    shared: Arc<PollerShared>,
}

impl PollerHandle {
    /// Whether the replication loop is still absorbing mutations. Flips to
    /// false after a stop request or a protocol-violation fail-stop.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PollerState {
        *self.shared.state.lock().expect("poller state lock poisoned")
    }

    /// Asks the loop to exit after the fetch in flight.
    pub fn request_stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Blocks until the warm-up latch fires or `timeout` elapses. Returns
    /// whether replay caught up with the log head in time.
    pub fn await_warmup(&self, timeout: Duration) -> bool {
        self.shared.warmup.wait_timeout(timeout)
    }

    /// Whether the warm-up latch has fired.
    pub fn warmed_up(&self) -> bool {
        self.shared.warmup.is_fired()
    }

    /// Blocks until the loop acknowledges shutdown or `timeout` elapses.
    pub fn await_shutdown(&self, timeout: Duration) -> bool {
        self.shared.shutdown.wait_timeout(timeout)
    }

    /// Total fetches issued against the channel.
    pub fn polls_total(&self) -> u64 {
        self.shared.polls_total.load(Ordering::SeqCst)
    }

    /// Total records decoded and applied to the local cache.
    pub fn records_applied(&self) -> u64 {
        self.shared.records_applied.load(Ordering::SeqCst)
    }
}

/// Long-lived replay loop: the only writer to the local cache.
///
/// On startup it attaches under its fresh consumer identity, rewinds to the
/// earliest retained offset, and replays the full mutation history before
/// settling into steady-state tailing. The first empty fetch is taken as
/// "caught up to head" and fires the warm-up latch; a concurrently arriving
/// record can race that signal, which is accepted rather than corrected.
pub struct ReplicationPoller {
    consumer: Box<dyn ChannelConsumer>,
    cache: CacheStore,
    poll_timeout: Duration,
    shared: Arc<PollerShared>,
}

impl ReplicationPoller {
    pub fn new(
        consumer: Box<dyn ChannelConsumer>,
        cache: CacheStore,
        poll_timeout: Duration,
    ) -> (Self, PollerHandle) {
        let shared = Arc::new(PollerShared {
            running: AtomicBool::new(true),
            state: Mutex::new(PollerState::Created),
            warmup: Latch::default(),
            shutdown: Latch::default(),
            polls_total: AtomicU64::new(0),
            records_applied: AtomicU64::new(0),
        });
        let handle = PollerHandle {
            shared: shared.clone(),
        };
        (
            Self {
                consumer,
                cache,
                poll_timeout,
                shared,
            },
            handle,
        )
    }

    /// Runs the loop to completion. Consumes the poller; meant to be the
    /// body of one dedicated background thread.
    pub fn run(mut self) {
        self.transition(PollerState::Subscribing);
        if let Err(err) = self
            .consumer
            .subscribe()
            .and_then(|()| self.consumer.seek_to_earliest())
        {
            error!(error = %err, "failed to attach replication consumer; halting");
            self.shared.running.store(false, Ordering::SeqCst);
        } else {
            self.transition(PollerState::Replaying);
        }

        'poll: while self.shared.running.load(Ordering::SeqCst) {
            trace!("polling");
            let batch = match self.consumer.poll(self.poll_timeout) {
                Ok(batch) => batch,
                Err(err) => {
                    error!(error = %err, "fetch failed; halting replication");
                    self.shared.running.store(false, Ordering::SeqCst);
                    break 'poll;
                }
            };
            self.shared.polls_total.fetch_add(1, Ordering::SeqCst);
            if batch.is_empty() {
                // The first empty fetch means replay has consumed the full
                // history up to this point.
                trace!("empty fetch");
                if !self.shared.warmup.is_fired() {
                    debug!("cache warmed up");
                    self.shared.warmup.fire();
                    self.transition(PollerState::SteadyState);
                }
                continue;
            }
            for record in &batch {
                if !self.apply(record) {
                    self.shared.running.store(false, Ordering::SeqCst);
                    break 'poll;
                }
            }
        }

        self.transition(PollerState::Stopping);
        self.consumer.close();
        self.transition(PollerState::Stopped);
        debug!("replication poller finished; firing shutdown latch");
        self.shared.shutdown.fire();
    }

    /// Applies one replayed record to the cache. Returns false on a protocol
    /// violation, which fail-stops the loop: continuing to apply a partially
    /// understood stream risks silent divergence, so the repository keeps
    /// serving local reads but stops absorbing mutations.
    fn apply(&self, record: &ChannelRecord) -> bool {
        let Some(action) = CacheAction::from_wire(&record.value) else {
            error!(
                value = %record.value,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "unrecognized action value; halting replication"
            );
            return false;
        };
        match (action, record.key.as_deref()) {
            (CacheAction::Add, Some(id)) => {
                debug!(id, "adding to cache");
                self.cache.put(id);
            }
            (CacheAction::Remove, Some(id)) => {
                debug!(id, "removing from cache");
                self.cache.delete(id);
            }
            (CacheAction::Clear, _) => {
                debug!("clearing cache");
                self.cache.clear();
            }
            (CacheAction::Add | CacheAction::Remove, None) => {
                error!(
                    %action,
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "action record is missing its key; halting replication"
                );
                return false;
            }
        }
        self.shared.records_applied.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn transition(&self, next: PollerState) {
        let mut state = self.shared.state.lock().expect("poller state lock poisoned");
        *state = next;
    }
}

impl Drop for ReplicationPoller {
    fn drop(&mut self) {
        // Releases the consumer even when the poller never ran, e.g. when
        // the spawn of its thread failed. Close is idempotent, so the
        // explicit close at the end of `run` is unaffected.
        self.consumer.close();
    }
}
