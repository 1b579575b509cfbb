use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use palaver_node::{Node, SharedNode};
use palaver_types::models::Peer;
use palaver_types::wire::{ExchangeRequest, ReplicateRequest};

use crate::client::PeerClient;

/// Tunable parameters of the anti-entropy loop. Fan-out and interval
/// are deliberately configuration, not constants.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Address peers can reach this node at; excluded from peer
    /// selection and advertised in every exchange.
    pub advertised_addr: String,
    /// Time between ticks.
    pub interval: Duration,
    /// Peers contacted per tick.
    pub fanout: usize,
    /// Per-attempt network timeout.
    pub peer_timeout: Duration,
    /// Grace period before the first tick, giving the transport time
    /// to come up.
    pub start_delay: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            advertised_addr: String::new(),
            interval: Duration::from_secs(2),
            fanout: 1,
            peer_timeout: Duration::from_secs(1),
            start_delay: Duration::from_secs(3),
        }
    }
}

/// Outcome of one pairwise exchange, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Exchange completed; counts of messages pulled from and pushed
    /// to the peer.
    Applied { pulled: usize, pushed: usize },
    /// Nothing to do this tick (node not initialized, or no peers).
    Skipped,
    /// The peer was unreachable or errored; it stays eligible for
    /// future ticks.
    Failed(String),
}

/// The background anti-entropy loop.
///
/// Each tick picks a small random subset of peers and performs a
/// bidirectional exchange with each: pull what we are missing, push
/// what they are missing, update bookkeeping. Failures are absorbed
/// here; nothing escalates past this engine.
pub struct GossipEngine {
    node: SharedNode,
    client: PeerClient,
    config: GossipConfig,
}

impl GossipEngine {
    pub fn new(node: SharedNode, config: GossipConfig) -> Result<Self> {
        let client = PeerClient::new(config.peer_timeout)?;
        Ok(Self {
            node,
            client,
            config,
        })
    }

    /// Run forever. Spawn this on its own task; abort the task to stop
    /// the loop (ticks are independent, so cancellation between ticks
    /// loses nothing).
    pub async fn run(self) {
        info!(
            "Gossip engine starting (interval {:?}, fanout {})",
            self.config.interval, self.config.fanout
        );
        tokio::time::sleep(self.config.start_delay).await;

        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One gossip round. Public so tests can drive the engine without
    /// the timer.
    pub async fn tick(&self) -> Vec<ExchangeOutcome> {
        let node = match self.node.read().await.clone() {
            Some(node) => node,
            // Nothing to replicate until the node has an identity.
            None => return vec![ExchangeOutcome::Skipped],
        };

        let peers = match node.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                warn!("Gossip tick could not read peer registry: {}", e);
                return vec![ExchangeOutcome::Failed(e.to_string())];
            }
        };

        let eligible: Vec<Peer> = peers
            .into_iter()
            .filter(|p| p.addr != self.config.advertised_addr)
            .collect();
        if eligible.is_empty() {
            return vec![ExchangeOutcome::Skipped];
        }

        // Uniform random subset: no peer is systematically starved and
        // per-tick fan-out stays bounded.
        let chosen: Vec<Peer> = {
            let mut rng = rand::rng();
            eligible
                .choose_multiple(&mut rng, self.config.fanout)
                .cloned()
                .collect()
        };

        let mut outcomes = Vec::with_capacity(chosen.len());
        for peer in &chosen {
            let outcome = self.exchange_with(&node, peer).await;
            match &outcome {
                ExchangeOutcome::Applied { pulled, pushed } if *pulled > 0 || *pushed > 0 => {
                    info!(
                        "Gossip with {}: pulled {}, pushed {}",
                        peer.addr, pulled, pushed
                    );
                }
                ExchangeOutcome::Failed(reason) => {
                    debug!("Gossip with {} skipped: {}", peer.addr, reason);
                }
                _ => {}
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Bidirectional exchange with one peer: send our clock table,
    /// admit the peer's delta, push back the delta it is missing,
    /// record the peer's acknowledged clocks.
    async fn exchange_with(&self, node: &Arc<Node>, peer: &Peer) -> ExchangeOutcome {
        let request = ExchangeRequest {
            node_id: node.identity().to_string(),
            addr: self.config.advertised_addr.clone(),
            clocks: node.clocks().await,
            room: None,
        };

        let response = match self.client.exchange(&peer.addr, &request).await {
            Ok(response) => response,
            Err(e) => return ExchangeOutcome::Failed(e.to_string()),
        };
        let peer_clocks = response.clocks.clone();

        let (pulled, _) = match node.admit_all(response.messages).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Admitting gossip delta from {} failed: {}", peer.addr, e);
                return ExchangeOutcome::Failed(e.to_string());
            }
        };

        let delta = match node.messages_after(None, &peer_clocks).await {
            Ok(delta) => delta,
            Err(e) => {
                warn!("Computing delta for {} failed: {}", peer.addr, e);
                return ExchangeOutcome::Failed(e.to_string());
            }
        };
        let pushed = if delta.is_empty() {
            0
        } else {
            let push = ReplicateRequest {
                node_id: node.identity().to_string(),
                messages: delta,
            };
            match self.client.replicate(&peer.addr, &push).await {
                Ok(response) => response.applied,
                Err(e) => return ExchangeOutcome::Failed(e.to_string()),
            }
        };

        if let Err(e) = node
            .mark_peer_synced(&peer.addr, &response.node_id, &peer_clocks)
            .await
        {
            warn!("Peer bookkeeping for {} failed: {}", peer.addr, e);
        }

        ExchangeOutcome::Applied { pulled, pushed }
    }
}
