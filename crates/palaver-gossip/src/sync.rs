use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use palaver_node::Node;
use palaver_types::wire::ExchangeRequest;

use crate::client::PeerClient;

/// What an on-demand room sync accomplished. Failure is not
/// representable on purpose: sync is best-effort and the caller always
/// falls back to whatever is already stored locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Peer that answered, if any.
    pub contacted: Option<String>,
    /// Messages admitted from its delta.
    pub applied: usize,
}

/// Request-scoped single-room catch-up, used when a client opens a
/// room so it does not have to wait for the next gossip tick.
pub struct SyncCoordinator {
    advertised_addr: String,
    client: PeerClient,
    /// Upper bound on peers tried per sync; the first answer wins.
    max_attempts: usize,
}

impl SyncCoordinator {
    pub fn new(advertised_addr: String, peer_timeout: Duration, max_attempts: usize) -> Result<Self> {
        Ok(Self {
            advertised_addr,
            client: PeerClient::new(peer_timeout)?,
            max_attempts,
        })
    }

    /// Pull the delta for exactly `room_id` from the first reachable
    /// peer and admit it. Never fails: with no reachable peer the
    /// report is empty and the local store is untouched.
    pub async fn sync_room(&self, node: &Arc<Node>, room_id: &str) -> SyncReport {
        let peers = match node.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                debug!("Room sync could not read peer registry: {}", e);
                return SyncReport::default();
            }
        };

        let request = ExchangeRequest {
            node_id: node.identity().to_string(),
            addr: self.advertised_addr.clone(),
            clocks: node.clocks().await,
            room: Some(room_id.to_string()),
        };

        for peer in peers
            .iter()
            .filter(|p| p.addr != self.advertised_addr)
            .take(self.max_attempts)
        {
            let response = match self.client.exchange(&peer.addr, &request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Room sync: peer {} unreachable: {}", peer.addr, e);
                    continue;
                }
            };
            let peer_clocks = response.clocks.clone();

            let (applied, duplicates) = match node.admit_all(response.messages).await {
                Ok(counts) => counts,
                Err(e) => {
                    debug!("Room sync: admitting delta from {} failed: {}", peer.addr, e);
                    continue;
                }
            };

            if let Err(e) = node
                .mark_peer_synced(&peer.addr, &response.node_id, &peer_clocks)
                .await
            {
                debug!("Room sync: bookkeeping for {} failed: {}", peer.addr, e);
            }

            info!(
                "Synced room '{}' from {}: {} new, {} duplicate",
                room_id, peer.addr, applied, duplicates
            );
            return SyncReport {
                contacted: Some(peer.addr.clone()),
                applied,
            };
        }

        debug!("Room sync for '{}' found no reachable peer", room_id);
        SyncReport::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_db::Database;
    use palaver_gateway::dispatcher::Dispatcher;

    async fn node(identity: &str) -> Arc<Node> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(
            Node::restore(db, Dispatcher::new(), identity.to_string())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn sync_with_no_peers_is_an_empty_success() {
        let node = node("alice").await;
        let sync =
            SyncCoordinator::new("http://me".into(), Duration::from_millis(200), 3).unwrap();

        let report = sync.sync_room(&node, "general").await;
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn sync_with_only_unreachable_peers_leaves_store_unchanged() {
        let node = node("alice").await;
        node.local_send("general", "already here").await.unwrap();
        node.add_peer("http://127.0.0.1:9").await.unwrap();

        let sync =
            SyncCoordinator::new("http://me".into(), Duration::from_millis(200), 3).unwrap();
        let report = sync.sync_room(&node, "general").await;

        assert_eq!(report.contacted, None);
        assert_eq!(report.applied, 0);
        let stored = node.query("general", 50, 0).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "already here");
    }
}
