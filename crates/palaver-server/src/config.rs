use std::time::Duration;

use anyhow::{Context, Result};

/// Node configuration, read from `PALAVER_*` environment variables
/// (with `.env` support via dotenvy in `main`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    /// Pre-seeded identity; when unset the node stays uninitialized
    /// until the first `/node/initialize` call.
    pub node_id: Option<String>,
    /// Address peers use to reach this node.
    pub advertised_addr: String,
    /// Statically configured peer addresses.
    pub peers: Vec<String>,
    pub gossip_interval: Duration,
    pub gossip_fanout: usize,
    pub peer_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = var_or("PALAVER_HOST", "0.0.0.0");
        let port: u16 = var_or("PALAVER_PORT", "7400")
            .parse()
            .context("PALAVER_PORT must be a port number")?;
        let advertised_addr =
            var_or("PALAVER_ADVERTISED_ADDR", &format!("http://localhost:{port}"));

        let peers = var_or("PALAVER_PEERS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let gossip_interval = Duration::from_millis(
            var_or("PALAVER_GOSSIP_INTERVAL_MS", "2000")
                .parse()
                .context("PALAVER_GOSSIP_INTERVAL_MS must be milliseconds")?,
        );
        let gossip_fanout = var_or("PALAVER_GOSSIP_FANOUT", "1")
            .parse()
            .context("PALAVER_GOSSIP_FANOUT must be a count")?;
        let peer_timeout = Duration::from_millis(
            var_or("PALAVER_PEER_TIMEOUT_MS", "1000")
                .parse()
                .context("PALAVER_PEER_TIMEOUT_MS must be milliseconds")?,
        );

        Ok(Self {
            host,
            port,
            db_path: var_or("PALAVER_DB_PATH", "palaver.db"),
            node_id: std::env::var("PALAVER_NODE_ID").ok().filter(|s| !s.is_empty()),
            advertised_addr,
            peers,
            gossip_interval,
            gossip_fanout,
            peer_timeout,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
