//! Cache Module
//!
//! Local storage engine: byte-budgeted TTL stores, the LRU-K admission cache
//! built on top of them, and the thread-safe wrapper a group owns.

mod admission;
mod byteview;
mod entry;
mod local;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use admission::AdmissionCache;
pub use byteview::ByteView;
pub use entry::StoreEntry;
pub use local::{LocalCache, DEFAULT_SWEEP_INTERVAL};
pub use lru::LruList;
pub use stats::{CacheStats, StatsCounters};
pub use store::{EvictionCallback, ExpiringEvictionStore};

// == Public Constants ==
/// Default admission threshold: a key must be touched twice before it enters
/// the main tier.
pub const DEFAULT_ADMISSION_K: u32 = 2;
