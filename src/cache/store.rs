//! Eviction Store Module
//!
//! Byte-budgeted LRU store with optional per-entry TTL. Expired entries are
//! dropped lazily on access and actively by [`ExpiringEvictionStore::clean_expired`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cache::entry::{accounted_size, deadline_after, is_expired};
use crate::cache::{ByteView, LruList, StoreEntry};
use crate::tasks::Sweep;

/// Hook invoked whenever an entry leaves a store.
pub type EvictionCallback = Arc<dyn Fn(&str, &ByteView) + Send + Sync>;

// == Expiring Eviction Store ==
/// Single key-space store with byte-budget LRU eviction and optional TTL.
///
/// `used_bytes` always equals the sum of `key.len() + value.len()` over the
/// indexed entries and never exceeds `max_bytes` after a mutation, unless
/// `max_bytes` is zero (unbounded).
pub struct ExpiringEvictionStore {
    /// Byte budget, 0 = unbounded
    max_bytes: usize,
    /// Bytes currently charged
    used_bytes: usize,
    /// Recency order, front = most recent
    list: LruList<StoreEntry>,
    /// Key to list slot
    index: HashMap<String, usize>,
    /// Absolute expiration deadlines
    deadlines: HashMap<String, Instant>,
    /// TTL applied by `add`, zero = no deadline
    default_ttl: Duration,
    on_evicted: Option<EvictionCallback>,
}

impl ExpiringEvictionStore {
    // == Constructor ==
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `max_bytes` - Byte budget, 0 disables size-based eviction
    /// * `on_evicted` - Optional callback fired for every entry that leaves the store
    pub fn new(max_bytes: usize, on_evicted: Option<EvictionCallback>) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            list: LruList::new(),
            index: HashMap::new(),
            deadlines: HashMap::new(),
            default_ttl: Duration::ZERO,
            on_evicted,
        }
    }

    /// Sets the TTL used by [`ExpiringEvictionStore::add`].
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == Get ==
    /// Retrieves a value and marks it most recently used.
    ///
    /// An entry whose deadline has passed is removed first and reported as
    /// missing.
    pub fn get(&mut self, key: &str) -> Option<ByteView> {
        if self.expire_if_due(key, Instant::now()) {
            return None;
        }
        let idx = *self.index.get(key)?;
        self.list.move_to_front(idx);
        self.list.get(idx).map(|entry| entry.value.clone())
    }

    // == Add ==
    /// Stores a value using the default TTL.
    pub fn add(&mut self, key: &str, value: ByteView) {
        self.add_with_ttl(key, value, self.default_ttl);
    }

    // == Add With TTL ==
    /// Inserts or replaces a value and marks it most recently used.
    ///
    /// A non-zero `ttl` sets or refreshes the deadline; a zero `ttl` clears
    /// it. Least recently used entries are evicted until the budget holds.
    pub fn add_with_ttl(&mut self, key: &str, value: ByteView, ttl: Duration) {
        match deadline_after(ttl) {
            Some(deadline) => {
                self.deadlines.insert(key.to_string(), deadline);
            }
            None => {
                self.deadlines.remove(key);
            }
        }

        if let Some(&idx) = self.index.get(key) {
            self.list.move_to_front(idx);
            if let Some(entry) = self.list.get_mut(idx) {
                self.used_bytes = self.used_bytes - entry.value.len() + value.len();
                entry.value = value;
            }
        } else {
            self.used_bytes += accounted_size(key, &value);
            let idx = self.list.push_front(StoreEntry::new(key, value));
            self.index.insert(key.to_string(), idx);
        }

        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            if self.remove_oldest().is_none() {
                break;
            }
        }
    }

    // == Remove ==
    /// Deletes an entry unconditionally, firing the eviction callback.
    pub fn remove(&mut self, key: &str) -> Option<ByteView> {
        let entry = self.detach(key)?;
        self.notify(&entry);
        Some(entry.value)
    }

    // == Remove Oldest ==
    /// Evicts the least recently used entry.
    pub fn remove_oldest(&mut self) -> Option<(String, ByteView)> {
        let key = self.list.back()?.key.clone();
        let entry = self.detach(&key)?;
        debug!(key = %entry.key, bytes = entry.size(), "evicted oldest entry");
        self.notify(&entry);
        Some((entry.key, entry.value))
    }

    // == Clean Expired ==
    /// Removes every entry whose deadline has passed.
    ///
    /// Returns the number of entries removed.
    pub fn clean_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| is_expired(**deadline, now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            trace!(key = %key, "removing expired entry");
            self.remove(&key);
        }
        count
    }

    // == Peek ==
    /// Returns a value without touching recency or expiring it.
    pub fn peek(&self, key: &str) -> Option<&ByteView> {
        let idx = *self.index.get(key)?;
        self.list.get(idx).map(|entry| &entry.value)
    }

    // == Contains ==
    /// Checks for a live entry without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        if !self.index.contains_key(key) {
            return false;
        }
        match self.deadlines.get(key) {
            Some(&deadline) => !is_expired(deadline, Instant::now()),
            None => true,
        }
    }

    // == Length ==
    /// Returns the number of indexed entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Keys ordered from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.list.iter().map(|entry| entry.key.clone()).collect()
    }

    // == Holds ==
    /// Expires the key if due, then reports whether it is still indexed.
    pub(crate) fn holds(&mut self, key: &str) -> bool {
        !self.expire_if_due(key, Instant::now()) && self.index.contains_key(key)
    }

    // == Visit Tracking ==
    /// Increments the visit count of an entry without touching recency.
    pub(crate) fn bump_visits(&mut self, key: &str) -> Option<u32> {
        let idx = *self.index.get(key)?;
        let entry = self.list.get_mut(idx)?;
        entry.visits = entry.visits.saturating_add(1);
        Some(entry.visits)
    }

    // == Take ==
    /// Detaches an entry without firing the eviction callback.
    pub(crate) fn take(&mut self, key: &str) -> Option<StoreEntry> {
        self.detach(key)
    }

    fn detach(&mut self, key: &str) -> Option<StoreEntry> {
        let idx = self.index.remove(key)?;
        self.deadlines.remove(key);
        let entry = self.list.remove(idx)?;
        self.used_bytes -= entry.size();
        Some(entry)
    }

    fn expire_if_due(&mut self, key: &str, now: Instant) -> bool {
        match self.deadlines.get(key) {
            Some(&deadline) if is_expired(deadline, now) => {
                trace!(key = %key, "entry expired on access");
                self.remove(key);
                true
            }
            _ => false,
        }
    }

    fn notify(&self, entry: &StoreEntry) {
        if let Some(callback) = &self.on_evicted {
            callback(&entry.key, &entry.value);
        }
    }
}

impl fmt::Debug for ExpiringEvictionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringEvictionStore")
            .field("max_bytes", &self.max_bytes)
            .field("used_bytes", &self.used_bytes)
            .field("len", &self.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl Sweep for Mutex<ExpiringEvictionStore> {
    fn sweep_expired(&self) -> usize {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clean_expired()
    }
}
