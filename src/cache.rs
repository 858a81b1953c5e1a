use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Default bound on the number of identifiers remembered locally.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Bounded membership cache of previously seen identifiers.
///
/// The cache is a rebuildable projection of the broadcast log, never the
/// durable source of truth. It holds at most `capacity` identifiers and
/// evicts the least-recently-inserted entry on overflow, so knowledge of an
/// old identifier may be silently dropped: false negatives over time, never
/// false positives.
///
/// Handles are cheap clones over shared state. The replication poller is the
/// sole writer; facade callers read concurrently from arbitrary threads.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<RwLock<CacheInner>>,
}

#[derive(Debug)]
struct CacheInner {
    capacity: usize,
    next_seq: u64,
    entries: HashMap<String, u64>,
    order: BTreeMap<u64, String>,
}

impl CacheStore {
    /// Creates an empty store bounded to `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                capacity: capacity.max(1),
                next_seq: 0,
                entries: HashMap::new(),
                order: BTreeMap::new(),
            })),
        }
    }

    /// Marks `id` as seen, refreshing its recency if already present and
    /// evicting the oldest entry when the bound is exceeded.
    pub fn put(&self, id: &str) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        if let Some(seq) = inner.entries.remove(id) {
            inner.order.remove(&seq);
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.entries.insert(id.to_string(), seq);
        inner.order.insert(seq, id.to_string());
        if inner.entries.len() > inner.capacity {
            if let Some((_, evicted)) = inner.order.pop_first() {
                inner.entries.remove(&evicted);
            }
        }
    }

    /// Forgets `id`; returns whether it was present.
    pub fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        match inner.entries.remove(id) {
            Some(seq) => {
                inner.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    /// Pure membership read; does not refresh recency.
    pub fn contains_key(&self, id: &str) -> bool {
        self.inner
            .read()
            .expect("cache lock poisoned")
            .entries
            .contains_key(id)
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().expect("cache lock poisoned").entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.inner.read().expect("cache lock poisoned").capacity
    }
}
