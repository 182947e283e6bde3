//! Store Entry Module
//!
//! Defines the record kept per key and the TTL deadline helpers.

use std::time::Duration;

use tokio::time::Instant;

use crate::cache::ByteView;

// == Store Entry ==
/// A single key/value record inside an eviction store.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The entry key
    pub key: String,
    /// The stored value
    pub value: ByteView,
    /// Touch count, only meaningful inside an admission history tier
    pub visits: u32,
}

impl StoreEntry {
    // == Constructor ==
    pub fn new(key: impl Into<String>, value: ByteView) -> Self {
        Self {
            key: key.into(),
            value,
            visits: 0,
        }
    }

    // == Accounted Size ==
    /// Bytes charged against the store budget: key length plus value length.
    pub fn size(&self) -> usize {
        accounted_size(&self.key, &self.value)
    }
}

// == Utility Functions ==
/// Bytes charged for a key/value pair.
pub fn accounted_size(key: &str, value: &ByteView) -> usize {
    key.len() + value.len()
}

/// Returns the absolute deadline for `ttl`, or None when `ttl` is zero.
pub fn deadline_after(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Some(Instant::now() + ttl)
    }
}

/// Checks a deadline against `now`.
///
/// Boundary condition: an entry is expired once `now >= deadline`, so the
/// entry is gone as soon as the TTL has fully elapsed.
pub fn is_expired(deadline: Instant, now: Instant) -> bool {
    now >= deadline
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_size_counts_key_and_value() {
        let entry = StoreEntry::new("key1", ByteView::from("value1"));
        assert_eq!(entry.size(), 10);
        assert_eq!(entry.visits, 0);
    }

    #[test]
    fn test_zero_ttl_has_no_deadline() {
        assert!(deadline_after(Duration::ZERO).is_none());
        assert!(deadline_after(Duration::from_secs(60)).is_some());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Instant::now();
        assert!(is_expired(now, now), "Entry should be expired at boundary");
        assert!(!is_expired(now + Duration::from_millis(1), now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let deadline = deadline_after(Duration::from_secs(1)).unwrap();
        assert!(!is_expired(deadline, Instant::now()));

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(is_expired(deadline, Instant::now()));
    }
}
