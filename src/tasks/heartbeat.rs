//! Discovery Heartbeat Task
//!
//! Registers this node with a [`ServiceRegistry`] and renews the lease at a
//! third of its TTL. A lost lease is re-registered on the next beat; stopping
//! the task revokes the lease so peers drop the node at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::discovery::{LeaseId, ServiceRegistry};
use crate::tasks::{period, TaskHandle};

/// Spawns the heartbeat for `addr` under `service`.
///
/// # Arguments
/// * `registry` - Directory to announce this node in
/// * `service` - Service name shared by all nodes of the cluster
/// * `addr` - Address peers should use to reach this node
/// * `ttl` - Lease lifetime; renewals happen every `ttl / 3`
pub fn spawn_heartbeat(
    registry: Arc<dyn ServiceRegistry>,
    service: impl Into<String>,
    addr: impl Into<String>,
    ttl: Duration,
) -> TaskHandle {
    let service = service.into();
    let addr = addr.into();
    let (stop, mut stopped) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let beat = period(ttl / 3);
        let mut ticker = tokio::time::interval(beat);
        let mut lease: Option<LeaseId> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                    continue;
                }
            }

            lease = match lease {
                Some(id) => match registry.keep_alive(id).await {
                    Ok(()) => {
                        debug!(lease = %id, "lease renewed");
                        Some(id)
                    }
                    Err(err) => {
                        warn!(lease = %id, error = %err, "lease lost, registering again");
                        None
                    }
                },
                None => match registry.register(&service, &addr, ttl).await {
                    Ok(id) => {
                        info!(service = %service, addr = %addr, lease = %id, "registered with discovery");
                        Some(id)
                    }
                    Err(err) => {
                        warn!(service = %service, error = %err, "discovery registration failed");
                        None
                    }
                },
            };
        }

        if let Some(id) = lease {
            match registry.revoke(id).await {
                Ok(()) => info!(addr = %addr, "discovery lease revoked"),
                Err(err) => warn!(lease = %id, error = %err, "failed to revoke lease"),
            }
        }
    });

    TaskHandle { stop, handle }
}
