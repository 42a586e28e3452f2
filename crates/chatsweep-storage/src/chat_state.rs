//! Persisted chat membership (the set of chats the bot is active in) and the
//! per-chat join names that hang off it.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use chatsweep_core::error::ChatSweepError;

use crate::db::{format_timestamp, Database};
use crate::ledger::{rekey_rows, remove_chat_rows};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinNameUpdate {
    Set,
    Updated,
    Taken,
}

/// What an abandonment actually removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbandonedChat {
    pub was_active: bool,
    pub messages_removed: usize,
    pub join_name_removed: bool,
}

impl AbandonedChat {
    pub fn changed_anything(&self) -> bool {
        self.was_active || self.messages_removed > 0 || self.join_name_removed
    }
}

impl Database {
    pub fn is_chat_active(&self, chat_id: i64) -> Result<bool, ChatSweepError> {
        let conn = self.lock_conn();
        let found = conn
            .query_row(
                "SELECT 1 FROM active_chats WHERE chat_id = ?1",
                params![chat_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Returns false when the chat was already active.
    pub fn insert_active_chat(
        &self,
        chat_id: i64,
        joined_at: DateTime<Utc>,
    ) -> Result<bool, ChatSweepError> {
        let conn = self.lock_conn();
        let rows = conn.execute(
            "INSERT OR IGNORE INTO active_chats (chat_id, joined_at) VALUES (?1, ?2)",
            params![chat_id, format_timestamp(joined_at)],
        )?;
        Ok(rows > 0)
    }

    pub fn active_chat_ids(&self) -> Result<Vec<i64>, ChatSweepError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare("SELECT chat_id FROM active_chats ORDER BY chat_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Forgets a chat entirely: membership, tracked messages and join name.
    /// Abandoning an unknown chat changes nothing.
    pub fn abandon_chat(&self, chat_id: i64) -> Result<AbandonedChat, ChatSweepError> {
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        let was_active = tx.execute(
            "DELETE FROM active_chats WHERE chat_id = ?1",
            params![chat_id],
        )? > 0;
        let messages_removed = remove_chat_rows(&tx, chat_id)?;
        let join_name_removed = tx.execute(
            "DELETE FROM chat_join_names WHERE chat_id = ?1",
            params![chat_id],
        )? > 0;
        tx.commit()?;
        Ok(AbandonedChat {
            was_active,
            messages_removed,
            join_name_removed,
        })
    }

    /// Moves an active chat to its new identifier in one transaction.
    ///
    /// Returns false without touching anything when `old_chat_id` is not
    /// active, which is what makes a repeated migration notice harmless.
    pub fn migrate_chat(&self, old_chat_id: i64, new_chat_id: i64) -> Result<bool, ChatSweepError> {
        if old_chat_id == new_chat_id {
            return Ok(false);
        }
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        let joined_at: Option<Option<String>> = tx
            .query_row(
                "SELECT joined_at FROM active_chats WHERE chat_id = ?1",
                params![old_chat_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(joined_at) = joined_at else {
            return Ok(false);
        };

        tx.execute(
            "DELETE FROM active_chats WHERE chat_id = ?1",
            params![old_chat_id],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO active_chats (chat_id, joined_at) VALUES (?1, ?2)",
            params![new_chat_id, joined_at],
        )?;
        rekey_rows(&tx, old_chat_id, new_chat_id)?;
        tx.execute(
            "UPDATE OR REPLACE chat_join_names SET chat_id = ?2 WHERE chat_id = ?1",
            params![old_chat_id, new_chat_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn set_join_name(&self, chat_id: i64, name: &str) -> Result<JoinNameUpdate, ChatSweepError> {
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        let owner: Option<i64> = tx
            .query_row(
                "SELECT chat_id FROM chat_join_names WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if matches!(owner, Some(id) if id != chat_id) {
            return Ok(JoinNameUpdate::Taken);
        }
        let existing = tx
            .query_row(
                "SELECT 1 FROM chat_join_names WHERE chat_id = ?1",
                params![chat_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        tx.execute(
            "INSERT INTO chat_join_names (chat_id, name) VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET name = excluded.name",
            params![chat_id, name],
        )?;
        tx.commit()?;
        Ok(if existing {
            JoinNameUpdate::Updated
        } else {
            JoinNameUpdate::Set
        })
    }

    pub fn chat_for_join_name(&self, name: &str) -> Result<Option<i64>, ChatSweepError> {
        let conn = self.lock_conn();
        let chat_id = conn
            .query_row(
                "SELECT chat_id FROM chat_join_names WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(chat_id)
    }

    pub fn join_name_for_chat(&self, chat_id: i64) -> Result<Option<String>, ChatSweepError> {
        let conn = self.lock_conn();
        let name = conn
            .query_row(
                "SELECT name FROM chat_join_names WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }
}
