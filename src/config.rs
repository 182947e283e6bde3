//! Configuration Module
//!
//! Handles loading and managing node configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_ADMISSION_K;
use crate::group::{GroupOptions, DEFAULT_MAX_BYTES};
use crate::ring::DEFAULT_REPLICAS;

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address this node listens on and announces to peers
    pub node_addr: String,
    /// Static peer addresses seeded into discovery
    pub peers: Vec<String>,
    /// Name of the demo group, also used as the discovery service name
    pub group_name: String,
    /// Byte budget of each cache tier
    pub cache_max_bytes: usize,
    /// Touches before a key enters the main tier
    pub admission_k: u32,
    /// TTL in milliseconds for cached values, 0 for none
    pub default_ttl_ms: u64,
    /// Active expiry sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Virtual positions per node on the hash ring
    pub ring_replicas: usize,
    /// Remote fetch deadline in milliseconds
    pub peer_timeout_ms: u64,
    /// Discovery lease lifetime in seconds
    pub lease_ttl_secs: u64,
    /// Membership refresh interval in seconds
    pub refresh_interval_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `NODE_ADDR` - Listen/announce address (default: 127.0.0.1:8001)
    /// - `PEERS` - Comma-separated static peers (default: none)
    /// - `GROUP_NAME` - Group and service name (default: scores)
    /// - `CACHE_MAX_BYTES` - Per-tier byte budget (default: 2048)
    /// - `ADMISSION_K` - Admission threshold (default: 2)
    /// - `DEFAULT_TTL_MS` - Value TTL in milliseconds (default: 0)
    /// - `SWEEP_INTERVAL_SECS` - Expiry sweep interval (default: 60)
    /// - `RING_REPLICAS` - Virtual nodes per peer (default: 50)
    /// - `PEER_TIMEOUT_MS` - Remote fetch deadline (default: 5000)
    /// - `LEASE_TTL_SECS` - Discovery lease TTL (default: 5)
    /// - `REFRESH_INTERVAL_SECS` - Membership refresh interval (default: 2)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            node_addr: env::var("NODE_ADDR").unwrap_or(defaults.node_addr),
            peers: env::var("PEERS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.peers),
            group_name: env::var("GROUP_NAME").unwrap_or(defaults.group_name),
            cache_max_bytes: parse_var("CACHE_MAX_BYTES", defaults.cache_max_bytes),
            admission_k: parse_var("ADMISSION_K", defaults.admission_k),
            default_ttl_ms: parse_var("DEFAULT_TTL_MS", defaults.default_ttl_ms),
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            ring_replicas: parse_var("RING_REPLICAS", defaults.ring_replicas),
            peer_timeout_ms: parse_var("PEER_TIMEOUT_MS", defaults.peer_timeout_ms),
            lease_ttl_secs: parse_var("LEASE_TTL_SECS", defaults.lease_ttl_secs),
            refresh_interval_secs: parse_var(
                "REFRESH_INTERVAL_SECS",
                defaults.refresh_interval_secs,
            ),
        }
    }

    /// Group tunables derived from this configuration.
    pub fn group_options(&self) -> GroupOptions {
        GroupOptions::default()
            .with_max_bytes(self.cache_max_bytes)
            .with_admission_k(self.admission_k)
            .with_default_ttl(Duration::from_millis(self.default_ttl_ms))
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_secs))
            .with_peer_timeout(Duration::from_millis(self.peer_timeout_ms))
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_addr: "127.0.0.1:8001".to_string(),
            peers: Vec::new(),
            group_name: "scores".to_string(),
            cache_max_bytes: DEFAULT_MAX_BYTES,
            admission_k: DEFAULT_ADMISSION_K,
            default_ttl_ms: 0,
            sweep_interval_secs: 60,
            ring_replicas: DEFAULT_REPLICAS,
            peer_timeout_ms: 5000,
            lease_ttl_secs: 5,
            refresh_interval_secs: 2,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(String::from)
        .collect()
}
