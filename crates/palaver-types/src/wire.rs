//! Node-to-node replication schema.
//!
//! Fixed serde structs validated at the transport boundary; a peer that
//! sends anything else is rejected before the core sees it.

use palaver_clock::RoomClocks;
use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Opening half of a gossip exchange: "here is who I am and what I have
/// seen; send me what I am missing."
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeRequest {
    pub node_id: String,
    /// Address other nodes can reach the caller at. Lets a statically
    /// configured topology self-complete: the responder registers the
    /// caller as a peer.
    pub addr: String,
    /// Caller's per-room clock table. A room missing here reads as the
    /// empty clock, so its entire history counts as news.
    pub clocks: RoomClocks,
    /// Restrict the delta to one room (on-demand room sync). `None`
    /// means the full store (background gossip).
    pub room: Option<String>,
}

/// Responder's half: its own clock table plus every message the
/// caller's clocks have not covered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResponse {
    pub node_id: String,
    pub clocks: RoomClocks,
    pub messages: Vec<Message>,
}

/// Symmetric push closing the exchange: the delta the responder was
/// missing, computed against the clock it reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicateRequest {
    pub node_id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateResponse {
    pub applied: usize,
    pub duplicates: usize,
}
