//! Peer Refresh Task
//!
//! Polls discovery and rebuilds the peer pool whenever membership changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::discovery::ServiceRegistry;
use crate::peers::HttpPool;
use crate::tasks::{period, TaskHandle};

/// Spawns a task that syncs `pool` with the live members of `service`.
///
/// The first sync happens immediately.
pub fn spawn_peer_refresh(
    registry: Arc<dyn ServiceRegistry>,
    service: impl Into<String>,
    pool: Arc<HttpPool>,
    interval: Duration,
) -> TaskHandle {
    let service = service.into();
    let (stop, mut stopped) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period(interval));
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        debug!("peer refresh task stopped");
                        return;
                    }
                    continue;
                }
            }

            let addrs = match registry.discover(&service).await {
                Ok(addrs) => pool.membership(addrs),
                Err(err) => {
                    warn!(service = %service, error = %err, "peer discovery failed");
                    continue;
                }
            };
            if addrs == pool.peers() {
                continue;
            }
            if let Err(err) = pool.set_peers(&addrs) {
                warn!(error = %err, "rejected discovered peer set");
            }
        }
    });

    TaskHandle { stop, handle }
}
