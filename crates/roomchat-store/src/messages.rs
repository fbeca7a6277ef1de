//! CRUD operations for [`Message`] records and the [`MessageStore`] seam.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter};
use uuid::Uuid;

use roomchat_shared::Room;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageQuery, SortOrder};

/// Persistence capability the replicator consumes.
///
/// Implementations are driven from a single task and need not be `Sync`.
pub trait MessageStore: Send {
    /// Insert a message.  Returns `false` when a message with the same id is
    /// already stored (the existing row is left untouched).
    fn insert(&self, message: &Message) -> Result<bool>;

    /// Delete one message by id.  Returns `true` if a row was deleted.
    fn delete(&self, id: Uuid) -> Result<bool>;

    /// Delete every message matching `query`; returns the number removed.
    fn delete_matching(&self, query: &MessageQuery) -> Result<usize>;

    /// Make pending writes durable.
    fn save(&self) -> Result<()>;

    fn fetch(&self, query: &MessageQuery) -> Result<Vec<Message>>;

    fn count(&self, query: &MessageQuery) -> Result<u64>;
}

const COLUMNS: &str =
    "id, room, timestamp, sender_id, sender_name, text, attachment, is_from_current_user";

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO messages
                (id, room, timestamp, sender_id, sender_name, text, attachment, is_from_current_user)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id.to_string(),
                message.room.as_str(),
                format_timestamp(&message.timestamp),
                message.sender_id,
                message.sender_name,
                message.text,
                message.attachment,
                message.is_from_current_user,
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        let (clause, args) = where_clause(query);
        let order = match query.order {
            SortOrder::Oldest => "ASC",
            SortOrder::Newest => "DESC",
        };
        // rowid breaks timestamp ties in arrival order
        let sql = format!(
            "SELECT {COLUMNS} FROM messages{clause} ORDER BY timestamp {order}, rowid {order}"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message_by_id(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn count_messages(&self, query: &MessageQuery) -> Result<u64> {
        let (clause, args) = where_clause(query);
        let count: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM messages{clause}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn delete_message(&self, id: Uuid) -> Result<bool> {
        Ok(self.delete_messages(&MessageQuery::id(id))? > 0)
    }

    pub fn delete_messages(&self, query: &MessageQuery) -> Result<usize> {
        let (clause, args) = where_clause(query);
        let affected = self.conn().execute(
            &format!("DELETE FROM messages{clause}"),
            params_from_iter(args.iter()),
        )?;
        Ok(affected)
    }
}

impl MessageStore for Database {
    fn insert(&self, message: &Message) -> Result<bool> {
        self.insert_message(message)
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        self.delete_message(id)
    }

    fn delete_matching(&self, query: &MessageQuery) -> Result<usize> {
        self.delete_messages(query)
    }

    fn save(&self) -> Result<()> {
        self.checkpoint()
    }

    fn fetch(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        self.get_messages(query)
    }

    fn count(&self, query: &MessageQuery) -> Result<u64> {
        self.count_messages(query)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so lexical order in SQLite equals time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn where_clause(query: &MessageQuery) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();

    if let Some(room) = query.room {
        args.push(room.as_str().to_string());
        conditions.push(format!("room = ?{}", args.len()));
    }
    if let Some(id) = query.id {
        args.push(id.to_string());
        conditions.push(format!("id = ?{}", args.len()));
    }

    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), args)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let room_str: String = row.get(1)?;
    let ts_str: String = row.get(2)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let room: Room = room_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id,
        room,
        timestamp,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        text: row.get(5)?,
        attachment: row.get(6)?,
        is_from_current_user: row.get(7)?,
    })
}
