//! Message ledger: which messages exist in which chat, and when they were sent.
//!
//! Only identifiers and timestamps are kept; message content never reaches
//! storage.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use chatsweep_core::error::ChatSweepError;

use crate::db::{format_timestamp, parse_timestamp, Database};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub timestamp: DateTime<Utc>,
}

impl TrackedMessage {
    pub fn new(chat_id: i64, message_id: i64, timestamp: DateTime<Utc>) -> Self {
        TrackedMessage {
            chat_id,
            message_id,
            timestamp,
        }
    }
}

fn row_to_tracked_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedMessage> {
    let raw: String = row.get(2)?;
    let timestamp = parse_timestamp(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TrackedMessage {
        chat_id: row.get(0)?,
        message_id: row.get(1)?,
        timestamp,
    })
}

pub(crate) fn remove_chat_rows(conn: &Connection, chat_id: i64) -> Result<usize, ChatSweepError> {
    Ok(conn.execute(
        "DELETE FROM tracked_messages WHERE chat_id = ?1",
        params![chat_id],
    )?)
}

/// Moves every row of `old_chat_id` to `new_chat_id`. A row already present
/// under the new id with the same message id is replaced.
pub(crate) fn rekey_rows(
    conn: &Connection,
    old_chat_id: i64,
    new_chat_id: i64,
) -> Result<usize, ChatSweepError> {
    if old_chat_id == new_chat_id {
        return Ok(0);
    }
    Ok(conn.execute(
        "UPDATE OR REPLACE tracked_messages SET chat_id = ?2 WHERE chat_id = ?1",
        params![old_chat_id, new_chat_id],
    )?)
}

impl Database {
    /// Inserts or replaces the record keyed by `(chat_id, message_id)`.
    pub fn upsert_message(&self, msg: &TrackedMessage) -> Result<(), ChatSweepError> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO tracked_messages (chat_id, message_id, timestamp)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(chat_id, message_id) DO UPDATE SET timestamp = excluded.timestamp",
            params![msg.chat_id, msg.message_id, format_timestamp(msg.timestamp)],
        )?;
        Ok(())
    }

    /// Messages of `chat_id` strictly newer than `cutoff`, newest first.
    pub fn messages_since(
        &self,
        chat_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TrackedMessage>, ChatSweepError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT chat_id, message_id, timestamp
             FROM tracked_messages
             WHERE chat_id = ?1 AND timestamp > ?2
             ORDER BY timestamp DESC, message_id DESC",
        )?;
        let messages = stmt
            .query_map(
                params![chat_id, format_timestamp(cutoff)],
                row_to_tracked_message,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Returns true when a record was removed.
    pub fn remove_message(&self, chat_id: i64, message_id: i64) -> Result<bool, ChatSweepError> {
        let conn = self.lock_conn();
        let rows = conn.execute(
            "DELETE FROM tracked_messages WHERE chat_id = ?1 AND message_id = ?2",
            params![chat_id, message_id],
        )?;
        Ok(rows > 0)
    }

    pub fn remove_chat_messages(&self, chat_id: i64) -> Result<usize, ChatSweepError> {
        remove_chat_rows(&self.lock_conn(), chat_id)
    }

    /// Re-keys every record of `old_chat_id` in a single transaction.
    pub fn rekey_chat(&self, old_chat_id: i64, new_chat_id: i64) -> Result<usize, ChatSweepError> {
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        let moved = rekey_rows(&tx, old_chat_id, new_chat_id)?;
        tx.commit()?;
        Ok(moved)
    }

    /// Drops every record sent before `cutoff`, across all chats.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, ChatSweepError> {
        let conn = self.lock_conn();
        let rows = conn.execute(
            "DELETE FROM tracked_messages WHERE timestamp < ?1",
            params![format_timestamp(cutoff)],
        )?;
        Ok(rows)
    }

    pub fn tracked_chat_ids(&self) -> Result<Vec<i64>, ChatSweepError> {
        let conn = self.lock_conn();
        let mut stmt =
            conn.prepare("SELECT DISTINCT chat_id FROM tracked_messages ORDER BY chat_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn count_messages(&self, chat_id: i64) -> Result<i64, ChatSweepError> {
        let conn = self.lock_conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM tracked_messages WHERE chat_id = ?1",
            params![chat_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
