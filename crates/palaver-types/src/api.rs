use palaver_clock::RoomClocks;
use serde::{Deserialize, Serialize};

use crate::models::Peer;

// -- Node lifecycle --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InitializeRequest {
    /// Explicit identity to adopt. Omitted → reuse the persisted one or
    /// generate a fresh identity.
    pub node_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub node_id: String,
    pub clocks: RoomClocks,
    /// False when this call created the identity, true when it was
    /// already present and the call was a no-op.
    pub existed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub initialized: bool,
    pub node_id: Option<String>,
}

// -- Messages --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub room_id: String,
    pub content: String,
}

// -- Sync --

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncRoomResponse {
    pub status: String,
    pub room_id: String,
    /// Messages admitted by this sync; 0 when no peer was reachable.
    pub applied: usize,
}

// -- Peers --

#[derive(Debug, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<Peer>,
}
