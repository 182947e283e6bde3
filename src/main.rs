//! Meshcache node
//!
//! Serves one demo group backed by a small in-memory score table and joins
//! the cluster through discovery.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshcache::tasks::{spawn_heartbeat, spawn_peer_refresh};
use meshcache::{
    create_router, AppState, Config, GroupRegistry, HttpPool, LoaderFn, MemoryRegistry,
    PeerPicker, ServiceRegistry,
};

/// Main entry point for a cache node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the group registry and the demo group
/// 4. Register the peer pool and start discovery tasks
/// 5. Serve HTTP until SIGINT/SIGTERM, then revoke the lease
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting meshcache node");

    let config = Config::from_env();
    info!(
        "Configuration loaded: node={}, group={}, max_bytes={}, k={}, peers={:?}",
        config.node_addr,
        config.group_name,
        config.cache_max_bytes,
        config.admission_k,
        config.peers
    );

    // Unknown keys are a loader error
    let scores = demo_scores();
    let loader = LoaderFn(move |key: String| {
        let scores = Arc::clone(&scores);
        async move {
            info!("[slow db] search key: {}", key);
            scores
                .get(&key)
                .map(|value| value.clone().into_bytes())
                .ok_or_else(|| anyhow::anyhow!("{} not exist", key))
        }
    });

    let registry = Arc::new(GroupRegistry::new());
    let group = registry.new_group(
        config.group_name.clone(),
        Arc::new(loader),
        config.group_options(),
    )?;

    let pool = Arc::new(
        HttpPool::new(config.node_addr.clone(), config.ring_replicas)
            .context("failed to create peer pool")?,
    );
    pool.set_peers(&config.peers)
        .context("invalid peer address in PEERS")?;
    group.register_peers(Arc::clone(&pool) as Arc<dyn PeerPicker>);

    let discovery: Arc<dyn ServiceRegistry> = Arc::new(
        MemoryRegistry::new().with_static(&config.group_name, config.peers.clone()),
    );
    let heartbeat = spawn_heartbeat(
        Arc::clone(&discovery),
        config.group_name.clone(),
        config.node_addr.clone(),
        config.lease_ttl(),
    );
    let refresh = spawn_peer_refresh(
        discovery,
        config.group_name.clone(),
        Arc::clone(&pool),
        config.refresh_interval(),
    );
    info!("Discovery tasks started");

    let app = create_router(AppState::new(registry, config.node_addr.clone()));

    let listener = tokio::net::TcpListener::bind(&config.node_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.node_addr))?;
    info!("Node listening on http://{}", config.node_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    refresh.stop();
    heartbeat.shutdown().await;
    info!("Node shutdown complete");
    Ok(())
}

fn demo_scores() -> Arc<HashMap<String, String>> {
    Arc::new(
        [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
