//! HTTP Peer Transport
//!
//! `HttpPeer` fetches values from another node's `/_cache/:group/:key` route;
//! `HttpPool` maps keys to those clients through a [`HashRing`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info};

use crate::error::PeerError;
use crate::peers::{PeerPicker, RemotePeer};
use crate::ring::HashRing;

/// Route prefix peers serve cached values under.
pub const DEFAULT_BASE_PATH: &str = "/_cache/";

/// Default deadline for a single peer request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// == HTTP Peer ==
/// Client for one remote node.
#[derive(Debug, Clone)]
pub struct HttpPeer {
    base: Url,
    client: reqwest::Client,
}

impl HttpPeer {
    /// Creates a client for `addr` (`host:port` or a full `http://` URL).
    pub fn new(addr: &str) -> Result<Self, PeerError> {
        Self::with_client(addr, default_client()?)
    }

    /// Creates a client sharing an existing connection pool.
    pub fn with_client(addr: &str, client: reqwest::Client) -> Result<Self, PeerError> {
        let raw = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        let base = Url::parse(&raw)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| PeerError::InvalidAddress(addr.to_string()))?;
        Ok(Self { base, client })
    }

    /// URL of `key` in `group`, with both escaped as path segments.
    pub fn url_for(&self, group: &str, key: &str) -> Result<Url, PeerError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PeerError::InvalidAddress(self.base.to_string()))?
            .pop_if_empty()
            .extend(
                DEFAULT_BASE_PATH
                    .split('/')
                    .filter(|segment| !segment.is_empty()),
            )
            .push(group)
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl RemotePeer for HttpPeer {
    async fn get(&self, group: &str, key: &str) -> Result<Vec<u8>, PeerError> {
        let url = self.url_for(group, key)?;
        debug!(url = %url, "fetching from peer");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PeerError::Status {
                peer: self.base.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn default_client() -> Result<reqwest::Client, PeerError> {
    Ok(reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()?)
}

// == HTTP Pool ==
/// Peer picker over the current cluster membership.
///
/// The local address is part of the ring but never returned by
/// [`PeerPicker::pick_peer`].
pub struct HttpPool {
    self_addr: String,
    replicas: usize,
    client: reqwest::Client,
    state: RwLock<PoolState>,
}

#[derive(Default)]
struct PoolState {
    ring: Option<Arc<HashRing>>,
    peers: HashMap<String, Arc<HttpPeer>>,
}

impl HttpPool {
    /// Creates a pool for the node reachable at `self_addr`.
    ///
    /// # Arguments
    /// * `self_addr` - Address other nodes use to reach this one
    /// * `replicas` - Virtual positions per node on the ring
    pub fn new(self_addr: impl Into<String>, replicas: usize) -> Result<Self, PeerError> {
        Ok(Self {
            self_addr: self_addr.into(),
            replicas,
            client: default_client()?,
            state: RwLock::new(PoolState::default()),
        })
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    // == Set Peers ==
    /// Replaces the membership with `addrs`, rebuilding ring and clients.
    ///
    /// The local address always stays on the ring, so keys this node owns are
    /// never forwarded even when discovery has not listed it yet. Addresses
    /// that cannot be parsed are rejected before anything changes.
    pub fn set_peers<I, S>(&self, addrs: I) -> Result<(), PeerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addrs = self.membership(addrs);

        let ring = HashRing::new(self.replicas);
        ring.add(&addrs);

        let mut peers = HashMap::with_capacity(addrs.len());
        for addr in &addrs {
            let peer = HttpPeer::with_client(addr, self.client.clone())?;
            peers.insert(addr.clone(), Arc::new(peer));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.ring = Some(Arc::new(ring));
        state.peers = peers;
        info!(node = %self.self_addr, peers = ?addrs, "peer set updated");
        Ok(())
    }

    /// Sorted, deduplicated membership `addrs` would produce, self included.
    pub fn membership<I, S>(&self, addrs: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addrs: Vec<String> = addrs
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .chain(std::iter::once(self.self_addr.clone()))
            .collect();
        addrs.sort();
        addrs.dedup();
        addrs
    }

    /// Current membership, sorted.
    pub fn peers(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut addrs: Vec<String> = state.peers.keys().cloned().collect();
        addrs.sort();
        addrs
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn RemotePeer>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let owner = state.ring.as_ref()?.get(key)?;
        if owner == self.self_addr {
            return None;
        }
        debug!(key = %key, peer = %owner, "picked remote peer");
        let peer = state.peers.get(&owner)?;
        Some(Arc::clone(peer) as Arc<dyn RemotePeer>)
    }
}

impl fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_addr", &self.self_addr)
            .field("replicas", &self.replicas)
            .field("peers", &self.peers())
            .finish()
    }
}
