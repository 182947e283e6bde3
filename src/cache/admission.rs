//! Admission Cache Module
//!
//! LRU-K admission built from two eviction stores: keys start in a
//! probationary `history` tier and only move to the `main` tier on their K-th
//! touch, so one-off scans cannot flush the hot set.

use std::time::Duration;

use tracing::debug;

use crate::cache::{ByteView, EvictionCallback, ExpiringEvictionStore};

// == Admission Cache ==
/// Two-tier K-admission cache.
///
/// A key lives in at most one tier. While in `history` its visit count only
/// grows; reaching `k` moves it to `main` and drops the history record.
#[derive(Debug)]
pub struct AdmissionCache {
    history: ExpiringEvictionStore,
    main: ExpiringEvictionStore,
    k: u32,
}

impl AdmissionCache {
    // == Constructor ==
    /// Creates an admission cache.
    ///
    /// # Arguments
    /// * `k` - Touches required for promotion (0 is treated as 1)
    /// * `max_bytes` - Byte budget applied to each tier, 0 = unbounded
    /// * `default_ttl` - TTL applied to entries in both tiers, zero = none
    /// * `on_evicted` - Callback shared by both tiers
    pub fn new(
        k: u32,
        max_bytes: usize,
        default_ttl: Duration,
        on_evicted: Option<EvictionCallback>,
    ) -> Self {
        Self {
            history: ExpiringEvictionStore::new(max_bytes, on_evicted.clone())
                .with_default_ttl(default_ttl),
            main: ExpiringEvictionStore::new(max_bytes, on_evicted).with_default_ttl(default_ttl),
            k: k.max(1),
        }
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    // == Get ==
    /// Looks a key up, counting a history hit as one more touch.
    pub fn get(&mut self, key: &str) -> Option<ByteView> {
        if let Some(value) = self.main.get(key) {
            return Some(value);
        }

        let value = self.history.get(key)?;
        if let Some(visits) = self.history.bump_visits(key) {
            if visits >= self.k {
                self.promote(key);
            }
        }
        Some(value)
    }

    // == Add ==
    /// Writes a value, counting the write as a touch.
    pub fn add(&mut self, key: &str, value: ByteView) {
        if self.main.holds(key) {
            self.main.add(key, value);
            return;
        }

        if self.history.holds(key) {
            match self.history.bump_visits(key) {
                Some(visits) if visits >= self.k => {
                    self.history.take(key);
                    debug!(key = %key, visits, "promoted key on write");
                    self.main.add(key, value);
                }
                _ => self.history.add(key, value),
            }
            return;
        }

        if self.k == 1 {
            self.main.add(key, value);
        } else {
            self.history.add(key, value);
            self.history.bump_visits(key);
        }
    }

    // == Remove ==
    /// Removes a key from both tiers.
    pub fn remove(&mut self, key: &str) {
        self.history.remove(key);
        self.main.remove(key);
    }

    // == Remove Oldest ==
    /// Evicts the least recently used entry of the main tier.
    pub fn remove_oldest(&mut self) -> Option<(String, ByteView)> {
        self.main.remove_oldest()
    }

    // == Clean Expired ==
    /// Sweeps expired entries from both tiers.
    pub fn clean_expired(&mut self) -> usize {
        self.history.clean_expired() + self.main.clean_expired()
    }

    // == Length ==
    /// Entries across both tiers.
    pub fn len(&self) -> usize {
        self.history.len() + self.main.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.main.is_empty()
    }

    pub fn main_len(&self) -> usize {
        self.main.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn used_bytes(&self) -> usize {
        self.history.used_bytes() + self.main.used_bytes()
    }

    /// Read-only view of the main tier.
    pub fn main(&self) -> &ExpiringEvictionStore {
        &self.main
    }

    /// Read-only view of the history tier.
    pub fn history(&self) -> &ExpiringEvictionStore {
        &self.history
    }

    fn promote(&mut self, key: &str) {
        if let Some(entry) = self.history.take(key) {
            debug!(key = %key, visits = entry.visits, "promoted key on read");
            self.main.add(key, entry.value);
        }
    }
}
