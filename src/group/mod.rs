//! Group Module
//!
//! A cache group is a named, read-through cache over one loader. A `get`
//! checks the local cache, then coalesces concurrent misses into one load that
//! either forwards to the owning peer or runs the loader and caches the result.

mod registry;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cache::{
    ByteView, CacheStats, EvictionCallback, LocalCache, StatsCounters, DEFAULT_ADMISSION_K,
    DEFAULT_SWEEP_INTERVAL,
};
use crate::error::{GroupError, PeerError, Result};
use crate::flight::CallCoalescer;
use crate::peers::{PeerPicker, RemotePeer};

pub use registry::GroupRegistry;

/// Default deadline for fetching a key from its owning peer.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default byte budget of each cache tier.
pub const DEFAULT_MAX_BYTES: usize = 2 << 10;

// == Loader ==
/// Source of truth a group falls back to on a miss.
///
/// Errors are opaque and reach the caller unchanged.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts an async closure into a [`Loader`].
///
/// ```ignore
/// let loader = LoaderFn(|key: String| async move { Ok(key.into_bytes()) });
/// ```
pub struct LoaderFn<F>(pub F);

#[async_trait]
impl<F, Fut> Loader for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.0)(key.to_string()).await
    }
}

// == Group Options ==
/// Tunables for a [`CacheGroup`].
#[derive(Clone)]
pub struct GroupOptions {
    /// Byte budget of each admission tier; 0 means unbounded
    pub max_bytes: usize,
    /// Touches needed before a key enters the main tier
    pub admission_k: u32,
    /// TTL applied to cached values; zero means no expiry
    pub default_ttl: Duration,
    /// Pause between active expiry sweeps
    pub sweep_interval: Duration,
    /// Deadline for a single remote fetch
    pub peer_timeout: Duration,
    /// Invoked whenever an entry leaves the local cache
    pub on_evicted: Option<EvictionCallback>,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            admission_k: DEFAULT_ADMISSION_K,
            default_ttl: Duration::ZERO,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            on_evicted: None,
        }
    }
}

impl GroupOptions {
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_admission_k(mut self, k: u32) -> Self {
        self.admission_k = k;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    pub fn with_eviction_callback(mut self, callback: EvictionCallback) -> Self {
        self.on_evicted = Some(callback);
        self
    }
}

impl fmt::Debug for GroupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupOptions")
            .field("max_bytes", &self.max_bytes)
            .field("admission_k", &self.admission_k)
            .field("default_ttl", &self.default_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("peer_timeout", &self.peer_timeout)
            .field("on_evicted", &self.on_evicted.is_some())
            .finish()
    }
}

// == Cache Group ==
/// Named read-through cache.
pub struct CacheGroup {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: LocalCache,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    flight: CallCoalescer<Result<ByteView>>,
    peer_timeout: Duration,
    stats: Arc<StatsCounters>,
}

impl CacheGroup {
    /// Creates a group; register it with a [`GroupRegistry`] to serve it
    /// to peers.
    ///
    /// # Arguments
    /// * `name` - Group name, unique within a registry
    /// * `loader` - Fallback for keys no peer serves
    /// * `options` - Cache sizing, expiry and peer tunables
    pub fn new(name: impl Into<String>, loader: Arc<dyn Loader>, options: GroupOptions) -> Self {
        let stats = Arc::new(StatsCounters::new());

        let counters = Arc::clone(&stats);
        let user_callback = options.on_evicted;
        let on_evicted: EvictionCallback = Arc::new(move |key: &str, value: &ByteView| {
            counters.record_eviction();
            if let Some(callback) = &user_callback {
                callback(key, value);
            }
        });

        let main_cache = LocalCache::new(
            options.admission_k,
            options.max_bytes,
            options.default_ttl,
            Some(on_evicted),
        )
        .with_sweep_interval(options.sweep_interval);

        Self {
            name: name.into(),
            loader,
            main_cache,
            peers: OnceLock::new(),
            flight: CallCoalescer::new(),
            peer_timeout: options.peer_timeout,
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // == Peer Registration ==
    /// Installs the picker used to find remote owners.
    ///
    /// # Panics
    /// Panics when the group already has a picker.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if let Err(err) = self.try_register_peers(peers) {
            panic!("{}", err);
        }
    }

    /// Installs the picker, failing when one is already registered.
    pub fn try_register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<()> {
        self.peers
            .set(peers)
            .map_err(|_| GroupError::PeersAlreadyRegistered(self.name.clone()))
    }

    // == Get ==
    /// Returns the value for `key`, loading it on a miss.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(GroupError::EmptyKey);
        }
        self.stats.record_get();

        if let Some(value) = self.main_cache.get(key) {
            self.stats.record_hit();
            debug!(group = %self.name, key = %key, "cache hit");
            return Ok(value);
        }
        self.stats.record_miss();

        self.load(key).await
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        self.flight
            .run(key, || async {
                if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
                    match self.get_from_peer(peer.as_ref(), key).await {
                        Ok(value) => {
                            self.stats.record_peer_load();
                            return Ok(value);
                        }
                        Err(err) => {
                            self.stats.record_peer_error();
                            warn!(group = %self.name, key = %key, error = %err, "failed to get from peer, loading locally");
                        }
                    }
                }
                self.get_locally(key).await
            })
            .await
    }

    /// Remote values are not cached here; the owner keeps them fresh.
    async fn get_from_peer(
        &self,
        peer: &dyn RemotePeer,
        key: &str,
    ) -> std::result::Result<ByteView, PeerError> {
        let bytes = tokio::time::timeout(self.peer_timeout, peer.get(&self.name, key))
            .await
            .map_err(|_| PeerError::Timeout(self.peer_timeout))??;
        Ok(ByteView::from(bytes))
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = self.loader.load(key).await.map_err(|err| {
            self.stats.record_local_load_error();
            GroupError::loader(err)
        })?;
        self.stats.record_local_load();
        info!(group = %self.name, key = %key, bytes = bytes.len(), "loaded from source");

        let value = ByteView::from(bytes);
        self.populate_cache(key, value.clone());
        Ok(value)
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
    }

    /// Drops `key` from this node's cache. Other nodes are not told.
    pub fn remove(&self, key: &str) {
        self.main_cache.remove(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .snapshot(self.main_cache.len(), self.main_cache.used_bytes())
    }

    /// The local cache, for inspection.
    pub fn local_cache(&self) -> &LocalCache {
        &self.main_cache
    }
}

impl fmt::Debug for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheGroup")
            .field("name", &self.name)
            .field("main_cache", &self.main_cache)
            .field("has_peers", &self.peers.get().is_some())
            .field("peer_timeout", &self.peer_timeout)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Slow source of truth counting loads per key
    struct ScoreDb {
        rows: HashMap<&'static str, &'static str>,
        loads: Mutex<HashMap<String, usize>>,
        delay: Duration,
    }

    impl ScoreDb {
        fn new() -> Arc<Self> {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                rows: HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")]),
                loads: Mutex::new(HashMap::new()),
                delay,
            })
        }

        fn loads(&self, key: &str) -> usize {
            self.loads.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        fn total_loads(&self) -> usize {
            self.loads.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl Loader for ScoreDb {
        async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
            *self.loads.lock().unwrap().entry(key.to_string()).or_insert(0) += 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.rows.get(key) {
                Some(value) => Ok(value.as_bytes().to_vec()),
                None => Err(anyhow::anyhow!("{} not exist", key)),
            }
        }
    }

    /// Remote peer with a scripted outcome
    struct FakePeer {
        calls: AtomicUsize,
        reply: std::result::Result<&'static str, u16>,
        delay: Duration,
    }

    #[async_trait]
    impl RemotePeer for FakePeer {
        async fn get(&self, _group: &str, key: &str) -> std::result::Result<Vec<u8>, PeerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.reply {
                Ok(value) => Ok(format!("{}:{}", value, key).into_bytes()),
                Err(status) => Err(PeerError::Status {
                    peer: "fake".to_string(),
                    status,
                    message: String::new(),
                }),
            }
        }
    }

    /// Routes every key to the same peer
    struct AlwaysRemote(Arc<FakePeer>);

    impl PeerPicker for AlwaysRemote {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn RemotePeer>> {
            Some(Arc::clone(&self.0) as Arc<dyn RemotePeer>)
        }
    }

    fn fake_peer(reply: std::result::Result<&'static str, u16>, delay: Duration) -> Arc<FakePeer> {
        Arc::new(FakePeer {
            calls: AtomicUsize::new(0),
            reply,
            delay,
        })
    }

    fn scores_group(db: Arc<ScoreDb>) -> CacheGroup {
        CacheGroup::new("scores", db, GroupOptions::default())
    }

    #[tokio::test]
    async fn test_get() {
        let db = ScoreDb::new();
        let group = scores_group(Arc::clone(&db));

        for (key, value) in [("Tom", "630"), ("Jack", "589"), ("Sam", "567")] {
            assert_eq!(group.get(key).await.unwrap(), ByteView::from(value));
            assert_eq!(group.get(key).await.unwrap(), ByteView::from(value));
            assert_eq!(db.loads(key), 1, "cache {} miss", key);
        }

        let err = group.get("unknown").await.unwrap_err();
        assert_eq!(err.to_string(), "unknown not exist");
    }

    #[tokio::test]
    async fn test_empty_key_skips_loader() {
        let db = ScoreDb::new();
        let group = scores_group(Arc::clone(&db));

        let err = group.get("").await.unwrap_err();

        assert!(matches!(err, GroupError::EmptyKey));
        assert_eq!(db.total_loads(), 0);
    }

    #[tokio::test]
    async fn test_loader_error_is_not_cached() {
        let db = ScoreDb::new();
        let group = scores_group(Arc::clone(&db));

        assert!(group.get("Nami").await.is_err());
        assert!(group.get("Nami").await.is_err());

        assert_eq!(db.loads("Nami"), 2);
        assert!(group.local_cache().is_empty());
    }

    #[tokio::test]
    async fn test_remote_value_not_cached_locally() {
        let db = ScoreDb::new();
        let group = scores_group(Arc::clone(&db));
        let peer = fake_peer(Ok("remote"), Duration::ZERO);
        group.register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))));

        assert_eq!(group.get("Tom").await.unwrap(), ByteView::from("remote:Tom"));
        assert_eq!(group.get("Tom").await.unwrap(), ByteView::from("remote:Tom"));

        assert_eq!(peer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(db.total_loads(), 0);
        assert!(group.local_cache().is_empty());
        assert_eq!(group.stats().peer_loads, 2);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_loader() {
        let db = ScoreDb::new();
        let group = scores_group(Arc::clone(&db));
        let peer = fake_peer(Err(503), Duration::ZERO);
        group.register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))));

        assert_eq!(group.get("Jack").await.unwrap(), ByteView::from("589"));

        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.loads("Jack"), 1);
        assert_eq!(group.local_cache().len(), 1);

        let stats = group.stats();
        assert_eq!(stats.peer_errors, 1);
        assert_eq!(stats.local_loads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_peer_times_out() {
        let db = ScoreDb::new();
        let options = GroupOptions::default().with_peer_timeout(Duration::from_secs(5));
        let group = CacheGroup::new("scores", Arc::clone(&db) as Arc<dyn Loader>, options);
        let peer = fake_peer(Ok("late"), Duration::from_secs(60));
        group.register_peers(Arc::new(AlwaysRemote(peer)));

        let started = tokio::time::Instant::now();
        assert_eq!(group.get("Sam").await.unwrap(), ByteView::from("567"));

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(db.loads("Sam"), 1);
        assert_eq!(group.stats().peer_errors, 1);
    }

    #[test]
    #[should_panic(expected = "peers already registered")]
    fn test_register_peers_twice_panics() {
        let group = scores_group(ScoreDb::new());
        let peer = fake_peer(Ok("x"), Duration::ZERO);

        group.register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))));
        group.register_peers(Arc::new(AlwaysRemote(peer)));
    }

    #[test]
    fn test_try_register_peers_reports_error() {
        let group = scores_group(ScoreDb::new());
        let peer = fake_peer(Ok("x"), Duration::ZERO);

        assert!(group
            .try_register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))))
            .is_ok());
        let err = group
            .try_register_peers(Arc::new(AlwaysRemote(peer)))
            .unwrap_err();
        assert!(matches!(err, GroupError::PeersAlreadyRegistered(name) if name == "scores"));
    }

    #[tokio::test]
    async fn test_concurrent_misses_load_once() {
        let db = ScoreDb::with_delay(Duration::from_millis(100));
        let group = Arc::new(scores_group(Arc::clone(&db)));
        let mut tasks = Vec::new();

        for _ in 0..10 {
            let group = Arc::clone(&group);
            tasks.push(tokio::spawn(async move { group.get("Tom").await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), ByteView::from("630"));
        }

        assert_eq!(db.loads("Tom"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_error() {
        let db = ScoreDb::with_delay(Duration::from_millis(100));
        let group = Arc::new(scores_group(Arc::clone(&db)));

        let (a, b) = tokio::join!(group.get("ghost"), group.get("ghost"));

        assert_eq!(a.unwrap_err().to_string(), "ghost not exist");
        assert_eq!(b.unwrap_err().to_string(), "ghost not exist");
        assert_eq!(db.loads("ghost"), 1);
    }

    #[tokio::test]
    async fn test_remove_forces_reload() {
        let db = ScoreDb::new();
        let group = scores_group(Arc::clone(&db));

        group.get("Tom").await.unwrap();
        group.remove("Tom");
        group.get("Tom").await.unwrap();

        assert_eq!(db.loads("Tom"), 2);
    }

    #[tokio::test]
    async fn test_stats_and_eviction_callback() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let options = GroupOptions::default()
            .with_max_bytes(13)
            .with_eviction_callback(Arc::new(move |key: &str, _: &ByteView| {
                sink.lock().unwrap().push(key.to_string());
            }));
        let db = ScoreDb::new();
        let group = CacheGroup::new("scores", Arc::clone(&db) as Arc<dyn Loader>, options);

        // "Jack"+"589" and "Tom"+"630" fill the history tier exactly
        group.get("Jack").await.unwrap();
        group.get("Tom").await.unwrap();
        group.get("Sam").await.unwrap();

        assert_eq!(*evicted.lock().unwrap(), vec!["Jack".to_string()]);

        let stats = group.stats();
        assert_eq!(stats.gets, 3);
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.local_loads, 3);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.used_bytes, 12);
    }

    #[tokio::test]
    async fn test_loader_fn_adapter() {
        let loader = LoaderFn(|key: String| async move {
            if key == "boom" {
                anyhow::bail!("exploded");
            }
            Ok::<_, anyhow::Error>(key.to_uppercase().into_bytes())
        });
        let group = CacheGroup::new("upper", Arc::new(loader), GroupOptions::default());

        assert_eq!(group.get("abc").await.unwrap(), ByteView::from("ABC"));
        assert_eq!(group.get("boom").await.unwrap_err().to_string(), "exploded");
    }
}
