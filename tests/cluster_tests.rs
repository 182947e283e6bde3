//! Cluster Integration Tests
//!
//! Runs several real HTTP nodes on loopback and checks that keys are loaded
//! by their ring owner only, and that an unreachable owner falls back to the
//! local loader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshcache::{
    create_router, AppState, ByteView, CacheGroup, GroupOptions, GroupRegistry, HashRing,
    HttpPeer, HttpPool, LoaderFn, PeerError, PeerPicker, RemotePeer,
};
use tokio::net::TcpListener;

const REPLICAS: usize = 50;

struct Node {
    addr: String,
    group: Arc<CacheGroup>,
    loads: Arc<AtomicUsize>,
}

fn score_db() -> Arc<HashMap<String, String>> {
    Arc::new(
        (0..32)
            .map(|i| (format!("user{}", i), format!("{}", 500 + i)))
            .chain([("Tom".to_string(), "630".to_string())])
            .collect(),
    )
}

fn scores_group(db: Arc<HashMap<String, String>>) -> (CacheGroup, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let loader = LoaderFn(move |key: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        let db = Arc::clone(&db);
        async move {
            db.get(&key)
                .map(|value| value.clone().into_bytes())
                .ok_or_else(|| anyhow::anyhow!("{} not exist", key))
        }
    });
    let options = GroupOptions::default()
        .with_max_bytes(1 << 16)
        .with_peer_timeout(Duration::from_secs(2));
    (CacheGroup::new("scores", Arc::new(loader), options), loads)
}

/// Binds every listener first so all addresses are known before wiring.
async fn start_cluster(size: usize) -> Vec<Node> {
    let mut listeners = Vec::new();
    for _ in 0..size {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    let addrs: Vec<String> = listeners
        .iter()
        .map(|l| l.local_addr().unwrap().to_string())
        .collect();

    let db = score_db();
    let mut nodes = Vec::new();
    for (listener, addr) in listeners.into_iter().zip(&addrs) {
        let (group, loads) = scores_group(Arc::clone(&db));
        let registry = Arc::new(GroupRegistry::new());
        let group = registry.register(group).unwrap();

        let pool = Arc::new(HttpPool::new(addr.clone(), REPLICAS).unwrap());
        pool.set_peers(&addrs).unwrap();
        group.register_peers(pool as Arc<dyn PeerPicker>);

        let app = create_router(AppState::new(registry, addr.clone()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        nodes.push(Node {
            addr: addr.clone(),
            group,
            loads,
        });
    }
    nodes
}

fn owner_of(nodes: &[Node], key: &str) -> usize {
    let ring = HashRing::new(REPLICAS);
    ring.add(nodes.iter().map(|n| n.addr.as_str()));
    let owner = ring.get(key).unwrap();
    nodes.iter().position(|n| n.addr == owner).unwrap()
}

#[tokio::test]
async fn test_keys_are_loaded_by_their_owner() {
    let nodes = start_cluster(3).await;
    let entry = &nodes[0];

    let mut remote_keys = 0;
    for i in 0..32 {
        let key = format!("user{}", i);
        let value = entry.group.get(&key).await.unwrap();
        assert_eq!(value, ByteView::from(format!("{}", 500 + i)));
        if owner_of(&nodes, &key) != 0 {
            remote_keys += 1;
        }
    }
    assert!(remote_keys > 0, "ring put every key on the entry node");

    // Every key was loaded exactly once, somewhere
    let total: usize = nodes.iter().map(|n| n.loads.load(Ordering::SeqCst)).sum();
    assert_eq!(total, 32);
    assert_eq!(entry.loads.load(Ordering::SeqCst), 32 - remote_keys);

    // Remote values were not cached on the entry node
    assert_eq!(entry.group.local_cache().len(), 32 - remote_keys);
    assert_eq!(entry.group.stats().peer_loads, remote_keys as u64);
}

#[tokio::test]
async fn test_repeated_remote_gets_hit_owner_cache() {
    let nodes = start_cluster(3).await;
    let key = (0..32)
        .map(|i| format!("user{}", i))
        .find(|key| owner_of(&nodes, key) == 1)
        .expect("some key owned by node 1");

    for _ in 0..4 {
        nodes[0].group.get(&key).await.unwrap();
    }

    assert_eq!(nodes[0].loads.load(Ordering::SeqCst), 0);
    assert_eq!(nodes[1].loads.load(Ordering::SeqCst), 1);
    assert_eq!(nodes[1].group.stats().hits, 3);
}

#[tokio::test]
async fn test_unknown_key_error_reaches_caller() {
    let nodes = start_cluster(2).await;

    let err = nodes[0].group.get("ghost").await.unwrap_err();

    assert_eq!(err.to_string(), "ghost not exist");
}

#[tokio::test]
async fn test_unreachable_owner_falls_back_to_loader() {
    // Reserve an address, then close it so connections are refused
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live_addr = live.local_addr().unwrap().to_string();

    let (group, loads) = scores_group(score_db());
    let pool = Arc::new(HttpPool::new(live_addr.clone(), REPLICAS).unwrap());
    pool.set_peers([live_addr.as_str(), dead.as_str()]).unwrap();
    group.register_peers(pool);

    let ring = HashRing::new(REPLICAS);
    ring.add([live_addr.as_str(), dead.as_str()]);
    let key = (0..32)
        .map(|i| format!("user{}", i))
        .find(|key| ring.get(key).as_deref() == Some(dead.as_str()))
        .expect("some key owned by the dead node");

    let value = group.get(&key).await.unwrap();

    assert!(!value.is_empty());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(group.stats().peer_errors, 1);
    assert_eq!(group.local_cache().len(), 1);
}

#[tokio::test]
async fn test_http_peer_reports_status() {
    let nodes = start_cluster(1).await;
    let peer = HttpPeer::new(&nodes[0].addr).unwrap();

    assert_eq!(peer.get("scores", "Tom").await.unwrap(), b"630");

    match peer.get("users", "Tom").await {
        Err(PeerError::Status { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected a 404 status error, got {:?}", other),
    }
}
