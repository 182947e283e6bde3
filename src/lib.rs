//! Meshcache - an embeddable distributed read-through cache
//!
//! Each node keeps a byte-bounded LRU-K cache in front of a user loader.
//! Nodes share keys over a consistent-hash ring so a key is normally loaded
//! by its owner only, and concurrent misses for one key are coalesced.

pub mod api;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod flight;
pub mod group;
pub mod models;
pub mod peers;
pub mod ring;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::ByteView;
pub use config::Config;
pub use discovery::{MemoryRegistry, ServiceRegistry};
pub use error::{GroupError, PeerError};
pub use flight::CallCoalescer;
pub use group::{CacheGroup, GroupOptions, GroupRegistry, Loader, LoaderFn};
pub use peers::{HttpPeer, HttpPool, PeerPicker, RemotePeer};
pub use ring::HashRing;
