//! Local Cache Module
//!
//! Thread-safe wrapper a group uses around its admission cache, including the
//! lazily started TTL sweeper.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::cache::{AdmissionCache, ByteView, EvictionCallback};
use crate::tasks::{spawn_sweep_task, Sweep, TaskHandle};

/// Default pause between two active-expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// == Local Cache ==
/// Mutex-guarded [`AdmissionCache`] shared with a background sweeper.
#[derive(Debug)]
pub struct LocalCache {
    inner: Arc<Mutex<AdmissionCache>>,
    sweep_interval: Duration,
    sweeper: Mutex<Option<TaskHandle>>,
}

impl LocalCache {
    pub fn new(
        k: u32,
        max_bytes: usize,
        default_ttl: Duration,
        on_evicted: Option<EvictionCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AdmissionCache::new(
                k,
                max_bytes,
                default_ttl,
                on_evicted,
            ))),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweeper: Mutex::new(None),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.cache().get(key)
    }

    /// Stores a value, starting the sweeper on first use.
    pub fn add(&self, key: &str, value: ByteView) {
        self.cache().add(key, value);
        self.start_sweeper();
    }

    pub fn remove(&self, key: &str) {
        self.cache().remove(key);
    }

    pub fn len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.cache().used_bytes()
    }

    /// Runs `f` with the admission cache locked.
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut AdmissionCache) -> R) -> R {
        f(&mut self.cache())
    }

    // == Sweeper Lifecycle ==
    /// Starts the active-expiry sweeper unless one is already running.
    ///
    /// Outside a tokio runtime this is a no-op; entries then only expire on
    /// access.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            debug!("no tokio runtime, TTL sweeper not started");
            return;
        }
        *sweeper = Some(spawn_sweep_task(
            Arc::downgrade(&self.inner),
            self.sweep_interval,
        ));
    }

    /// Stops the sweeper; a later `add` starts a fresh one.
    pub fn stop_sweeper(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn cache(&self) -> MutexGuard<'_, AdmissionCache> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sweep for Mutex<AdmissionCache> {
    fn sweep_expired(&self) -> usize {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clean_expired()
    }
}
