use chrono::{DateTime, Utc};
use palaver_clock::{RoomClocks, VectorClock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message. Immutable once created.
///
/// `message_id` is the idempotency key: re-delivery through overlapping
/// gossip rounds is harmless because admission is keyed on it.
/// `created_at` is advisory wall-clock time, used only as a display
/// tie-break for concurrent messages — causality is decided by
/// `vector_clock` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub vector_clock: VectorClock,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a freshly-authored message with a random id and the
    /// author's clock snapshot (taken after incrementing its counter).
    pub fn new(room_id: &str, sender_id: &str, content: &str, vector_clock: VectorClock) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            vector_clock,
            created_at: Utc::now(),
        }
    }
}

/// A known replication peer.
///
/// Peers come from configuration or are learned when another node
/// initiates an exchange; they are never evicted on transient failure.
/// `last_clocks` holds, per room, the last clock the peer acknowledged
/// and drives delta computation on the next exchange. A room absent
/// from the table means the peer has never acknowledged it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Starts equal to `addr`, refined to the peer's node id after the
    /// first successful exchange.
    pub peer_id: String,
    pub addr: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_clocks: RoomClocks,
}

impl Peer {
    pub fn from_addr(addr: &str) -> Self {
        Self {
            peer_id: addr.to_string(),
            addr: addr.to_string(),
            last_seen: None,
            last_clocks: RoomClocks::new(),
        }
    }
}
