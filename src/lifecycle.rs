use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use chatsweep_core::error::ChatSweepError;
use chatsweep_storage::chat_state::AbandonedChat;
use chatsweep_storage::db::{call_blocking, Database};

/// A membership change observed on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The bot was added to a group, or a group was created with the bot in it.
    Joined(i64),
    /// The bot was removed from the group.
    Left(i64),
    Migrated { from: i64, to: i64 },
}

/// Resolves the (old, new) pair from a migration service message.
///
/// Telegram announces one migration twice: once from the old chat carrying
/// `migrate_to`, once from the new chat carrying `migrate_from`. Both resolve
/// to the same pair.
pub fn migration_pair(
    chat_id: i64,
    migrate_to: Option<i64>,
    migrate_from: Option<i64>,
) -> Option<(i64, i64)> {
    if migrate_to.is_none() && migrate_from.is_none() {
        return None;
    }
    let old = migrate_from.unwrap_or(chat_id);
    let new = migrate_to.unwrap_or(chat_id);
    (old != new).then_some((old, new))
}

/// Owner of the set of chats the bot is active in.
#[derive(Clone)]
pub struct ChatLifecycle {
    db: Arc<Database>,
}

impl ChatLifecycle {
    pub fn new(db: Arc<Database>) -> Self {
        ChatLifecycle { db }
    }

    pub async fn apply(
        &self,
        event: LifecycleEvent,
        at: DateTime<Utc>,
    ) -> Result<bool, ChatSweepError> {
        match event {
            LifecycleEvent::Joined(chat_id) => self.mark_joined(chat_id, at).await,
            LifecycleEvent::Left(chat_id) => Ok(self.abandon(chat_id).await?.changed_anything()),
            LifecycleEvent::Migrated { from, to } => self.migrate(from, to).await,
        }
    }

    pub async fn mark_joined(
        &self,
        chat_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, ChatSweepError> {
        let inserted =
            call_blocking(self.db.clone(), move |db| db.insert_active_chat(chat_id, at)).await?;
        if inserted {
            info!("Chat {chat_id} is now active");
        }
        Ok(inserted)
    }

    /// Drops the chat and everything stored for it. Safe to repeat.
    pub async fn abandon(&self, chat_id: i64) -> Result<AbandonedChat, ChatSweepError> {
        let abandoned = call_blocking(self.db.clone(), move |db| db.abandon_chat(chat_id)).await?;
        if abandoned.changed_anything() {
            info!(
                "Abandoned chat {chat_id} (was_active={}, messages_removed={}, join_name_removed={})",
                abandoned.was_active, abandoned.messages_removed, abandoned.join_name_removed
            );
        }
        Ok(abandoned)
    }

    /// Moves an active chat to a new identifier; a no-op if `from` is not active.
    pub async fn migrate(&self, from: i64, to: i64) -> Result<bool, ChatSweepError> {
        let moved = call_blocking(self.db.clone(), move |db| db.migrate_chat(from, to)).await?;
        if moved {
            info!("Chat id migrated from {from} to {to}");
        }
        Ok(moved)
    }

    pub async fn is_active(&self, chat_id: i64) -> Result<bool, ChatSweepError> {
        call_blocking(self.db.clone(), move |db| db.is_chat_active(chat_id)).await
    }

    /// Point-in-time copy of the active set; later changes do not affect it.
    pub async fn snapshot(&self) -> Result<Vec<i64>, ChatSweepError> {
        call_blocking(self.db.clone(), |db| db.active_chat_ids()).await
    }
}
