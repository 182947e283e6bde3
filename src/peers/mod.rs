//! Peers Module
//!
//! Capabilities a group needs to reach the node that owns a key, plus the
//! HTTP implementation of both.

mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PeerError;

pub use http::{HttpPeer, HttpPool, DEFAULT_BASE_PATH};

/// Client for one remote node.
///
/// Calls must be idempotent: a group may repeat them freely.
#[async_trait]
pub trait RemotePeer: Send + Sync {
    /// Fetches `key` from the named group on the remote node.
    async fn get(&self, group: &str, key: &str) -> Result<Vec<u8>, PeerError>;
}

/// Resolves the node that owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the remote owner of `key`, or None when this node owns it
    /// or there are no peers.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn RemotePeer>>;
}
