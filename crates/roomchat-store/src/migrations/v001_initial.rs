//! v001 -- Initial schema creation.
//!
//! Creates the `messages` and `profile` tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                   TEXT PRIMARY KEY NOT NULL,  -- UUID v4, same on every peer
    room                 TEXT NOT NULL,              -- room token "A".."H"
    timestamp            TEXT NOT NULL,              -- fixed-width RFC-3339, nanoseconds
    sender_id            TEXT NOT NULL,
    sender_name          TEXT NOT NULL,
    text                 TEXT,
    attachment           BLOB,
    is_from_current_user INTEGER NOT NULL DEFAULT 0  -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_messages_room_ts
    ON messages(room, timestamp ASC);

-- ----------------------------------------------------------------
-- Local user profile (single row)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profile (
    id           INTEGER PRIMARY KEY CHECK (id = 1),
    user_id      TEXT NOT NULL,
    display_name TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
