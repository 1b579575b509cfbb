use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Singleton row holding this node's persistent identity.
        CREATE TABLE IF NOT EXISTS node (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            node_id     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            message_id      TEXT PRIMARY KEY,
            room_id         TEXT NOT NULL,
            sender_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            vector_clock    TEXT NOT NULL,
            -- Microseconds since the Unix epoch; advisory display order only.
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at, message_id);

        CREATE TABLE IF NOT EXISTS peers (
            addr        TEXT PRIMARY KEY,
            peer_id     TEXT NOT NULL,
            last_seen   INTEGER,
            -- JSON object: room id -> acknowledged vector clock.
            last_clocks TEXT NOT NULL DEFAULT '{}'
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
