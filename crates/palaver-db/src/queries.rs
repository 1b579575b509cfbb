use anyhow::Result;
use palaver_clock::RoomClocks;
use palaver_types::models::{Message, Peer};
use rusqlite::{Connection, OptionalExtension};

use crate::Database;
use crate::models::{MessageRow, PeerRow};

impl Database {
    // -- Node identity --

    pub fn node_identity(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row("SELECT node_id FROM node WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(id)
        })
    }

    /// Persist the identity unless one already exists. Returns the
    /// identity that is durable after the call.
    pub fn persist_node_identity(&self, node_id: &str) -> Result<String> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO node (id, node_id) VALUES (1, ?1)",
                [node_id],
            )?;
            let stored: String =
                conn.query_row("SELECT node_id FROM node WHERE id = 1", [], |row| {
                    row.get(0)
                })?;
            Ok(stored)
        })
    }

    // -- Messages --

    /// Idempotent insert keyed on `message_id`. Returns true when the
    /// row was actually written, false when it already existed.
    pub fn insert_message_if_absent(&self, message: &Message) -> Result<bool> {
        self.with_conn(|conn| {
            let vc_json = serde_json::to_string(&message.vector_clock)?;
            let changed = conn.execute(
                "INSERT OR IGNORE INTO messages
                 (message_id, room_id, sender_id, content, vector_clock, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.message_id,
                    message.room_id,
                    message.sender_id,
                    message.content,
                    vc_json,
                    message.created_at.timestamp_micros(),
                ],
            )?;
            Ok(changed == 1)
        })
    }

    /// The most recent `limit` messages of a room (skipping `offset`
    /// newest-first), returned oldest-first so concurrent messages get
    /// the deterministic `(created_at, message_id)` display order.
    pub fn room_messages(&self, room_id: &str, limit: u32, offset: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, room_id, sender_id, content, vector_clock, created_at
                 FROM messages
                 WHERE room_id = ?1
                 ORDER BY created_at DESC, message_id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let mut rows = collect_messages(&mut stmt.query(rusqlite::params![
                room_id, limit, offset
            ])?)?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Every stored message of a room, oldest-first. Deltas are
    /// computed by filtering this against the requester's clock.
    pub fn room_messages_all(&self, room_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, room_id, sender_id, content, vector_clock, created_at
                 FROM messages
                 WHERE room_id = ?1
                 ORDER BY created_at ASC, message_id ASC",
            )?;
            collect_messages(&mut stmt.query([room_id])?)
        })
    }

    /// Every stored message, oldest-first. Used for startup clock
    /// reconstruction and full-store gossip deltas.
    pub fn all_messages(&self) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, room_id, sender_id, content, vector_clock, created_at
                 FROM messages
                 ORDER BY created_at ASC, message_id ASC",
            )?;
            collect_messages(&mut stmt.query([])?)
        })
    }

    /// Distinct room ids seen in the store.
    pub fn room_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT room_id FROM messages ORDER BY room_id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    // -- Peers --

    /// Register a peer by address, keeping any existing bookkeeping.
    pub fn add_peer_if_absent(&self, addr: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO peers (addr, peer_id) VALUES (?1, ?1)",
                [addr],
            )?;
            Ok(())
        })
    }

    /// Record a completed exchange: the peer's real node id, the clock
    /// table it acknowledged, and a fresh `last_seen`.
    pub fn mark_peer_synced(&self, addr: &str, peer_id: &str, clocks: &RoomClocks) -> Result<()> {
        self.with_conn(|conn| {
            let clocks_json = serde_json::to_string(clocks)?;
            conn.execute(
                "INSERT INTO peers (addr, peer_id, last_seen, last_clocks)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(addr) DO UPDATE SET
                    peer_id = excluded.peer_id,
                    last_seen = excluded.last_seen,
                    last_clocks = excluded.last_clocks",
                rusqlite::params![
                    addr,
                    peer_id,
                    chrono::Utc::now().timestamp_micros(),
                    clocks_json
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_peers(&self) -> Result<Vec<Peer>> {
        self.with_conn(|conn| query_peers(conn))
    }
}

fn collect_messages(rows: &mut rusqlite::Rows<'_>) -> Result<Vec<Message>> {
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let raw = MessageRow {
            message_id: row.get(0)?,
            room_id: row.get(1)?,
            sender_id: row.get(2)?,
            content: row.get(3)?,
            vector_clock: row.get(4)?,
            created_at: row.get(5)?,
        };
        out.push(raw.into_message()?);
    }
    Ok(out)
}

fn query_peers(conn: &Connection) -> Result<Vec<Peer>> {
    let mut stmt =
        conn.prepare("SELECT addr, peer_id, last_seen, last_clocks FROM peers ORDER BY addr")?;

    let raw = stmt
        .query_map([], |row| {
            Ok(PeerRow {
                addr: row.get(0)?,
                peer_id: row.get(1)?,
                last_seen: row.get(2)?,
                last_clocks: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter().map(PeerRow::into_peer).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use palaver_clock::VectorClock;

    fn message(id: &str, room: &str, sender: &str, at_micros: i64) -> Message {
        Message {
            message_id: id.to_string(),
            room_id: room.to_string(),
            sender_id: sender.to_string(),
            content: format!("content of {id}"),
            vector_clock: VectorClock::from([(sender, 1)]),
            created_at: Utc.timestamp_micros(at_micros).unwrap(),
        }
    }

    #[test]
    fn insert_is_idempotent_on_message_id() {
        let db = Database::open_in_memory().unwrap();
        let msg = message("m1", "general", "a", 1_000);

        assert!(db.insert_message_if_absent(&msg).unwrap());
        assert!(!db.insert_message_if_absent(&msg).unwrap());
        assert_eq!(db.room_messages_all("general").unwrap().len(), 1);
    }

    #[test]
    fn room_messages_orders_by_created_at_then_id() {
        let db = Database::open_in_memory().unwrap();
        // Same timestamp: message_id breaks the tie.
        db.insert_message_if_absent(&message("m2", "general", "b", 5_000))
            .unwrap();
        db.insert_message_if_absent(&message("m1", "general", "a", 5_000))
            .unwrap();
        db.insert_message_if_absent(&message("m0", "general", "a", 1_000))
            .unwrap();

        let msgs = db.room_messages("general", 50, 0).unwrap();
        let ids: Vec<&str> = msgs.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["m0", "m1", "m2"]);
    }

    #[test]
    fn room_messages_returns_most_recent_window() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_message_if_absent(&message(
                &format!("m{i}"),
                "general",
                "a",
                1_000 * (i + 1),
            ))
            .unwrap();
        }

        let msgs = db.room_messages("general", 2, 0).unwrap();
        let ids: Vec<&str> = msgs.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["m3", "m4"]);

        let older = db.room_messages("general", 2, 2).unwrap();
        let ids: Vec<&str> = older.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[test]
    fn room_ids_are_distinct() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message_if_absent(&message("m1", "general", "a", 1_000))
            .unwrap();
        db.insert_message_if_absent(&message("m2", "general", "a", 2_000))
            .unwrap();
        db.insert_message_if_absent(&message("m3", "dev", "a", 3_000))
            .unwrap();

        assert_eq!(db.room_ids().unwrap(), ["dev", "general"]);
    }

    #[test]
    fn identity_persists_first_writer() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.node_identity().unwrap().is_none());
        assert_eq!(db.persist_node_identity("alice").unwrap(), "alice");
        // A second write does not replace the stored identity.
        assert_eq!(db.persist_node_identity("bob").unwrap(), "alice");
        assert_eq!(db.node_identity().unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn peer_bookkeeping_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.add_peer_if_absent("http://peer-a:9000").unwrap();
        db.add_peer_if_absent("http://peer-a:9000").unwrap();

        let peers = db.list_peers().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].peer_id, "http://peer-a:9000");
        assert!(peers[0].last_seen.is_none());

        let clocks = RoomClocks::from([("general", VectorClock::from([("alice", 3)]))]);
        db.mark_peer_synced("http://peer-a:9000", "alice", &clocks)
            .unwrap();

        let peers = db.list_peers().unwrap();
        assert_eq!(peers[0].peer_id, "alice");
        assert_eq!(peers[0].last_clocks, clocks);
        assert!(peers[0].last_seen.is_some());
    }
}
