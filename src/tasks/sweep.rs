//! TTL Sweep Task
//!
//! Background task that periodically removes expired cache entries, even for
//! keys nobody reads any more.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::tasks::{period, TaskHandle};

/// Something holding entries with expiration deadlines.
pub trait Sweep: Send + Sync + 'static {
    /// Removes expired entries and returns how many were dropped.
    fn sweep_expired(&self) -> usize;
}

/// Spawns a background task that sweeps `target` every `interval`.
///
/// The task only holds a weak reference, so it also ends once the target is
/// dropped. Each pass takes the target's own lock for the duration of the
/// sweep only.
///
/// # Example
/// ```ignore
/// let store = Arc::new(Mutex::new(ExpiringEvictionStore::new(1024, None)));
/// let sweeper = spawn_sweep_task(Arc::downgrade(&store), Duration::from_secs(1));
/// // Later, during shutdown:
/// sweeper.stop();
/// ```
pub fn spawn_sweep_task<S: Sweep>(target: Weak<S>, interval: Duration) -> TaskHandle {
    let interval = period(interval);
    let (stop, mut stopped) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!(?interval, "starting TTL sweep task");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        debug!("TTL sweep task stopped");
                        return;
                    }
                    continue;
                }
            }

            let Some(target) = target.upgrade() else {
                debug!("sweep target dropped, ending TTL sweep task");
                return;
            };

            let removed = target.sweep_expired();
            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    });

    TaskHandle { stop, handle }
}
