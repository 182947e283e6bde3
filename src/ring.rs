//! Consistent Hash Ring
//!
//! Maps keys to owning nodes. Each node owns a fixed number of virtual
//! positions on a 32-bit ring; a key belongs to the first position at or
//! after its own hash, wrapping around at the end.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

/// Hash function used to place nodes and keys on the ring.
pub type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Virtual positions per node when none is configured.
pub const DEFAULT_REPLICAS: usize = 50;

#[derive(Debug, Default)]
struct RingState {
    /// Sorted virtual positions
    positions: Vec<u32>,
    /// Virtual position to node
    owners: HashMap<u32, String>,
    /// Nodes in the order they joined
    members: Vec<String>,
}

// == Hash Ring ==
/// Consistent-hash ring with virtual replicas.
///
/// Lookups take a read lock and never block each other; membership changes
/// take the write lock and keep positions sorted under it.
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    state: RwLock<RingState>,
}

impl HashRing {
    /// Creates a ring using CRC-32 (IEEE) as the hash.
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, Arc::new(crc32fast::hash))
    }

    /// Creates a ring with a custom hash function.
    ///
    /// A replica count of zero falls back to [`DEFAULT_REPLICAS`].
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            replicas: if replicas == 0 {
                DEFAULT_REPLICAS
            } else {
                replicas
            },
            hash,
            state: RwLock::new(RingState::default()),
        }
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    // == Add ==
    /// Places every replica of each node on the ring.
    ///
    /// Re-adding a node is a no-op. When two positions collide the earlier
    /// member owns it until it leaves.
    pub fn add<I, S>(&self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        for node in nodes {
            let node = node.as_ref();
            if state.members.iter().any(|member| member == node) {
                continue;
            }
            state.members.push(node.to_string());
            for position in self.positions_of(node) {
                if let Entry::Vacant(slot) = state.owners.entry(position) {
                    slot.insert(node.to_string());
                    state.positions.push(position);
                }
            }
        }
        state.positions.sort_unstable();
    }

    // == Get ==
    /// Returns the node owning `key`, or None when the ring is empty.
    pub fn get(&self, key: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = state.positions.partition_point(|&position| position < hash);
        let position = state.positions[idx % state.positions.len()];
        let owner = state.owners.get(&position).cloned();
        trace!(key = %key, hash, node = ?owner, "resolved key owner");
        owner
    }

    // == Remove ==
    /// Removes `node` from the ring.
    ///
    /// A position `node` won on a collision passes to the next member hashing
    /// there; only positions no other member claims are dropped.
    pub fn remove(&self, node: &str) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        let Some(idx) = state.members.iter().position(|member| member == node) else {
            return;
        };
        state.members.remove(idx);

        for position in self.positions_of(node) {
            if state.owners.get(&position).map(String::as_str) != Some(node) {
                continue;
            }
            let heir = state
                .members
                .iter()
                .find(|member| self.positions_of(member).any(|p| p == position))
                .cloned();
            match heir {
                Some(heir) => {
                    trace!(position, from = %node, to = %heir, "position handed over");
                    state.owners.insert(position, heir);
                }
                None => {
                    state.owners.remove(&position);
                    if let Ok(idx) = state.positions.binary_search(&position) {
                        state.positions.remove(idx);
                    }
                }
            }
        }
    }

    /// Nodes currently on the ring, sorted.
    pub fn nodes(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut nodes = state.members.clone();
        nodes.sort();
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .positions
            .is_empty()
    }

    fn positions_of<'a>(&'a self, node: &'a str) -> impl Iterator<Item = u32> + 'a {
        (0..self.replicas).map(move |i| (self.hash)(format!("{}{}", i, node).as_bytes()))
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("nodes", &self.nodes())
            .finish()
    }
}
