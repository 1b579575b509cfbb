use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Events pushed over the WebSocket gateway to room subscribers.
///
/// Admission is origin-blind: subscribers see every message admitted to
/// their room, whether it was authored locally or arrived via gossip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoomEvent {
    /// Server confirms the subscription.
    Subscribed { room_id: String, node_id: String },

    /// A message was admitted to the subscribed room.
    MessageAdmitted(Message),
}
