//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a node is up.
//!
//! # Tasks
//! - TTL Sweep: Removes expired cache entries at configured intervals
//! - Heartbeat: Keeps this node's discovery lease alive
//! - Peer Refresh: Feeds discovered membership into the peer pool

mod heartbeat;
mod refresh;
mod sweep;

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use heartbeat::spawn_heartbeat;
pub use refresh::spawn_peer_refresh;
pub use sweep::{spawn_sweep_task, Sweep};

/// Shortest period a background loop will tick at.
const MIN_PERIOD: Duration = Duration::from_millis(10);

fn period(interval: Duration) -> Duration {
    interval.max(MIN_PERIOD)
}

// == Task Handle ==
/// Handle to a running background task. Dropping the handle also stops the
/// task.
#[derive(Debug)]
pub struct TaskHandle {
    pub(crate) stop: watch::Sender<bool>,
    pub(crate) handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Signals the task to stop at its next wake-up.
    pub fn stop(self) {
        let _ = self.stop.send(true);
    }

    /// Signals the task to stop and waits for its cleanup to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "background task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
