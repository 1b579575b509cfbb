use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use palaver_clock::{RoomClocks, VectorClock};
use palaver_types::models::{Message, Peer};

/// Raw `messages` row before the clock JSON is parsed.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub message_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub vector_clock: String,
    pub created_at: i64,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let vector_clock: VectorClock = serde_json::from_str(&self.vector_clock)
            .with_context(|| format!("corrupt vector clock on message '{}'", self.message_id))?;
        let created_at = DateTime::from_timestamp_micros(self.created_at)
            .ok_or_else(|| anyhow!("corrupt created_at on message '{}'", self.message_id))?;

        Ok(Message {
            message_id: self.message_id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            content: self.content,
            vector_clock,
            created_at,
        })
    }
}

/// Raw `peers` row.
#[derive(Debug, Clone)]
pub struct PeerRow {
    pub addr: String,
    pub peer_id: String,
    pub last_seen: Option<i64>,
    pub last_clocks: String,
}

impl PeerRow {
    pub fn into_peer(self) -> Result<Peer> {
        let last_clocks: RoomClocks = serde_json::from_str(&self.last_clocks)
            .with_context(|| format!("corrupt clock table for peer '{}'", self.addr))?;
        let last_seen = match self.last_seen {
            Some(micros) => Some(
                DateTime::from_timestamp_micros(micros)
                    .ok_or_else(|| anyhow!("corrupt last_seen for peer '{}'", self.addr))?,
            ),
            None => None,
        };

        Ok(Peer {
            peer_id: self.peer_id,
            addr: self.addr,
            last_seen,
            last_clocks,
        })
    }
}
