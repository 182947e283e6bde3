//! Service Discovery
//!
//! Nodes announce themselves under a service name with a lease that must be
//! renewed before its TTL runs out; peers discover each other by listing the
//! live registrations.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::error::DiscoveryError;

/// Identifier of one registration lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(pub u64);

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Directory of live service addresses.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Announces `addr` under `service` for `ttl` unless renewed.
    async fn register(
        &self,
        service: &str,
        addr: &str,
        ttl: Duration,
    ) -> Result<LeaseId, DiscoveryError>;

    /// Renews a lease for another full TTL.
    async fn keep_alive(&self, lease: LeaseId) -> Result<(), DiscoveryError>;

    /// Withdraws a registration immediately.
    async fn revoke(&self, lease: LeaseId) -> Result<(), DiscoveryError>;

    /// Live addresses of `service`, sorted.
    async fn discover(&self, service: &str) -> Result<Vec<String>, DiscoveryError>;
}

#[derive(Debug)]
struct Lease {
    service: String,
    addr: String,
    ttl: Duration,
    deadline: Instant,
}

// == Memory Registry ==
/// In-process registry with lease expiry.
///
/// Static seeds are always discoverable and never expire.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    next_lease: AtomicU64,
    leases: Mutex<HashMap<LeaseId, Lease>>,
    seeds: HashMap<String, Vec<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds addresses that are listed for `service` without a lease.
    pub fn with_static<I, S>(mut self, service: &str, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seeds
            .entry(service.to_string())
            .or_default()
            .extend(addrs.into_iter().map(Into::into));
        self
    }

    /// Drops every lease whose TTL has run out.
    fn live_leases(&self) -> MutexGuard<'_, HashMap<LeaseId, Lease>> {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        leases.retain(|id, lease| {
            let live = now < lease.deadline;
            if !live {
                debug!(lease = %id, addr = %lease.addr, "lease expired");
            }
            live
        });
        leases
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn register(
        &self,
        service: &str,
        addr: &str,
        ttl: Duration,
    ) -> Result<LeaseId, DiscoveryError> {
        let id = LeaseId(self.next_lease.fetch_add(1, Ordering::Relaxed) + 1);
        self.live_leases().insert(
            id,
            Lease {
                service: service.to_string(),
                addr: addr.to_string(),
                ttl,
                deadline: Instant::now() + ttl,
            },
        );
        debug!(lease = %id, service = %service, addr = %addr, "registered");
        Ok(id)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<(), DiscoveryError> {
        let mut leases = self.live_leases();
        let entry = leases
            .get_mut(&lease)
            .ok_or(DiscoveryError::LeaseNotFound(lease))?;
        entry.deadline = Instant::now() + entry.ttl;
        Ok(())
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), DiscoveryError> {
        self.live_leases()
            .remove(&lease)
            .map(|_| ())
            .ok_or(DiscoveryError::LeaseNotFound(lease))
    }

    async fn discover(&self, service: &str) -> Result<Vec<String>, DiscoveryError> {
        let mut addrs: BTreeSet<String> = self
            .seeds
            .get(service)
            .map(|seeds| seeds.iter().cloned().collect())
            .unwrap_or_default();
        addrs.extend(
            self.live_leases()
                .values()
                .filter(|lease| lease.service == service)
                .map(|lease| lease.addr.clone()),
        );
        Ok(addrs.into_iter().collect())
    }
}
