//! Node identity, per-room clocks, and the atomic admission path.
//!
//! Local sends and replicated messages funnel through the same
//! [`Node::admit`] entry point, so once a message is admitted its
//! origin is indistinguishable.

pub mod error;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use palaver_clock::RoomClocks;
use palaver_db::Database;
use palaver_gateway::dispatcher::Dispatcher;
use palaver_types::models::{Message, Peer};

pub use error::NodeError;

/// Result of admitting one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The message was new: persisted, merged, published.
    Applied,
    /// The `message_id` was already present; nothing changed. Not an
    /// error — re-delivery through gossip is expected.
    Duplicate,
}

/// Slot the transport and gossip engine share. Empty until the first
/// `initialize` call gives the node an identity.
pub type SharedNode = Arc<RwLock<Option<Arc<Node>>>>;

pub fn shared_node() -> SharedNode {
    Arc::new(RwLock::new(None))
}

/// Process-wide node state: immutable identity plus the live per-room
/// clock table.
///
/// Rooms advance independently, so coverage of one room never stands
/// in for another. The clock mutex doubles as the admission lock:
/// every "check idempotency key, persist row, merge clock, notify
/// subscribers" sequence runs while holding it, so no room's clock can
/// get ahead of what is durably stored.
pub struct Node {
    identity: String,
    db: Arc<Database>,
    dispatcher: Dispatcher,
    clocks: Mutex<RoomClocks>,
}

impl Node {
    /// Rebuild the node from the durable store by folding every
    /// persisted message clock into its room's entry. Produces exactly
    /// the state live accumulation would have, which is why the clock
    /// table needs no persistence path of its own.
    pub async fn restore(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        identity: String,
    ) -> Result<Self, NodeError> {
        let replay_db = db.clone();
        let messages =
            tokio::task::spawn_blocking(move || replay_db.all_messages()).await??;

        let mut clocks = RoomClocks::new();
        for message in &messages {
            clocks.observe(&message.room_id, &message.vector_clock);
        }

        if !messages.is_empty() {
            info!(
                "Replayed {} messages; clocks restored for node '{}'",
                messages.len(),
                identity
            );
        }

        Ok(Self {
            identity,
            db,
            dispatcher,
            clocks: Mutex::new(clocks),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Snapshot of the per-room clock table.
    pub async fn clocks(&self) -> RoomClocks {
        self.clocks.lock().await.clone()
    }

    /// Author a brand-new message: raise our own counter in the room's
    /// clock, snapshot it into the message, persist, publish. The only
    /// path by which new (as opposed to replicated) messages enter the
    /// system.
    pub async fn local_send(&self, room_id: &str, content: &str) -> Result<Message, NodeError> {
        let mut clocks = self.clocks.lock().await;

        let mut next = clocks.room(room_id);
        next.increment(&self.identity);
        let message = Message::new(room_id, &self.identity, content, next.clone());

        let db = self.db.clone();
        let row = message.clone();
        tokio::task::spawn_blocking(move || db.insert_message_if_absent(&row)).await??;

        // The write is durable; only now may the clock advance.
        clocks.put(room_id, next);
        self.dispatcher.publish(&message);

        debug!(
            "Sent message {} to room '{}'",
            message.message_id, message.room_id
        );
        Ok(message)
    }

    /// Admit a replicated message idempotently. Duplicates leave both
    /// the store and the clock table untouched.
    pub async fn admit(&self, message: Message) -> Result<AdmitOutcome, NodeError> {
        let mut clocks = self.clocks.lock().await;

        let db = self.db.clone();
        let row = message.clone();
        let inserted =
            tokio::task::spawn_blocking(move || db.insert_message_if_absent(&row)).await??;

        if !inserted {
            return Ok(AdmitOutcome::Duplicate);
        }

        clocks.observe(&message.room_id, &message.vector_clock);
        self.dispatcher.publish(&message);
        Ok(AdmitOutcome::Applied)
    }

    /// Admit a batch, counting outcomes. Used by the replication
    /// endpoints and the gossip engine.
    ///
    /// Causal predecessors are admitted first (clock totals ascending):
    /// if a persist fails mid-batch, no room clock has yet claimed
    /// anything that depends on the failed message, so a later exchange
    /// still pulls it.
    pub async fn admit_all(&self, messages: Vec<Message>) -> Result<(usize, usize), NodeError> {
        let mut messages = messages;
        messages.sort_by_key(|m| m.vector_clock.total());

        let mut applied = 0;
        let mut duplicates = 0;
        for message in messages {
            match self.admit(message).await? {
                AdmitOutcome::Applied => applied += 1,
                AdmitOutcome::Duplicate => duplicates += 1,
            }
        }
        Ok((applied, duplicates))
    }

    /// The most recent `limit` messages of a room in deterministic
    /// `(created_at, message_id)` ascending order.
    pub async fn query(
        &self,
        room_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, NodeError> {
        let db = self.db.clone();
        let room = room_id.to_string();
        let messages =
            tokio::task::spawn_blocking(move || db.room_messages(&room, limit, offset)).await??;
        Ok(messages)
    }

    /// Distinct room ids seen in the store.
    pub async fn rooms(&self) -> Result<Vec<String>, NodeError> {
        let db = self.db.clone();
        let rooms = tokio::task::spawn_blocking(move || db.room_ids()).await??;
        Ok(rooms)
    }

    /// The gossip delta primitive: every stored message (optionally
    /// limited to one room) whose clock the requester's table has not
    /// covered for that message's room, i.e. compares `After` or
    /// `Concurrent` to the room entry. A room absent from the table is
    /// entirely news.
    pub async fn messages_after(
        &self,
        room_id: Option<&str>,
        peer_clocks: &RoomClocks,
    ) -> Result<Vec<Message>, NodeError> {
        let db = self.db.clone();
        let room = room_id.map(str::to_string);
        let stored = tokio::task::spawn_blocking(move || match room {
            Some(room) => db.room_messages_all(&room),
            None => db.all_messages(),
        })
        .await??;

        Ok(stored
            .into_iter()
            .filter(|m| peer_clocks.is_news(&m.room_id, &m.vector_clock))
            .collect())
    }

    // -- Peer registry --

    pub async fn peers(&self) -> Result<Vec<Peer>, NodeError> {
        let db = self.db.clone();
        let peers = tokio::task::spawn_blocking(move || db.list_peers()).await??;
        Ok(peers)
    }

    /// Register a peer address, keeping existing bookkeeping intact.
    pub async fn add_peer(&self, addr: &str) -> Result<(), NodeError> {
        let db = self.db.clone();
        let addr = addr.to_string();
        tokio::task::spawn_blocking(move || db.add_peer_if_absent(&addr)).await??;
        Ok(())
    }

    /// Record a completed exchange with a peer.
    pub async fn mark_peer_synced(
        &self,
        addr: &str,
        peer_id: &str,
        clocks: &RoomClocks,
    ) -> Result<(), NodeError> {
        let db = self.db.clone();
        let addr = addr.to_string();
        let peer_id = peer_id.to_string();
        let clocks = clocks.clone();
        tokio::task::spawn_blocking(move || db.mark_peer_synced(&addr, &peer_id, &clocks))
            .await??;
        Ok(())
    }
}
