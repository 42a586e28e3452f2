//! Per-chat and global cleanup passes.
//!
//! A pass deletes every tracked message that is still inside the retention
//! window, one transport call at a time, and reconciles the ledger with what
//! actually happened. Losing access to a chat aborts its pass and abandons
//! the chat; any other failure is counted and the pass moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use chatsweep_channels::transport::{FailureClass, SendOptions, SentMessage, Transport};
use chatsweep_core::error::ChatSweepError;
use chatsweep_storage::db::{call_blocking, Database};
use chatsweep_storage::ledger::TrackedMessage;

use crate::lifecycle::ChatLifecycle;
use crate::retention;

pub fn report_text(deleted: usize, failed: usize) -> String {
    format!("Removed {deleted} recent messages. Failed to remove: {failed}.")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCleanupOutcome {
    /// The pass ran to the end. `report` is `None` when sending the report
    /// failed for a transient reason.
    Completed {
        deleted: usize,
        failed: usize,
        report: Option<SentMessage>,
    },
    /// The bot lost access to the chat; the chat has been abandoned.
    Abandoned { deleted: usize },
    /// The chat moved to a new identifier mid-pass; its records were re-keyed.
    Migrated { to: i64, deleted: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalCleanupSummary {
    pub chats: usize,
    pub deleted: usize,
    pub failed: usize,
    pub abandoned: Vec<i64>,
    pub errored: Vec<i64>,
    pub pruned: usize,
}

enum Halt {
    AccessLost,
    Migrated(i64),
}

#[derive(Clone)]
pub struct CleanupEngine {
    db: Arc<Database>,
    lifecycle: ChatLifecycle,
    transport: Arc<dyn Transport>,
}

impl CleanupEngine {
    pub fn new(db: Arc<Database>, lifecycle: ChatLifecycle, transport: Arc<dyn Transport>) -> Self {
        CleanupEngine {
            db,
            lifecycle,
            transport,
        }
    }

    pub fn lifecycle(&self) -> &ChatLifecycle {
        &self.lifecycle
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Records a message seen in (or sent to) a chat so a later pass can delete it.
    pub async fn retain(&self, message: TrackedMessage) -> Result<(), ChatSweepError> {
        call_blocking(self.db.clone(), move |db| db.upsert_message(&message)).await
    }

    pub async fn cleanup_chat(
        &self,
        chat_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ChatCleanupOutcome, ChatSweepError> {
        let cutoff = retention::cutoff(now);
        let recent =
            call_blocking(self.db.clone(), move |db| db.messages_since(chat_id, cutoff)).await?;
        let eligible = retention::eligible_for_deletion(recent, cutoff);
        info!(
            "Cleanup: chat {chat_id} has {} deletable message(s) on {}",
            eligible.len(),
            self.transport_name()
        );

        let mut deleted = 0;
        let mut failed = 0;
        let mut halt = None;
        for message in &eligible {
            let message_id = message.message_id;
            match self.transport.delete_message(chat_id, message_id).await {
                Ok(true) => {
                    deleted += 1;
                    call_blocking(self.db.clone(), move |db| {
                        db.remove_message(chat_id, message_id)
                    })
                    .await?;
                }
                Ok(false) => {
                    failed += 1;
                    warn!("Cleanup: chat {chat_id} message {message_id} was not deleted");
                }
                Err(e) => match e.classify() {
                    FailureClass::AccessLost => {
                        error!("Cleanup: lost access to chat {chat_id} while deleting: {e}");
                        halt = Some(Halt::AccessLost);
                        break;
                    }
                    FailureClass::Migrated(to) => {
                        warn!("Cleanup: chat {chat_id} migrated to {to} mid-pass");
                        halt = Some(Halt::Migrated(to));
                        break;
                    }
                    FailureClass::Transient => {
                        failed += 1;
                        warn!("Cleanup: failed to delete chat {chat_id} message {message_id}: {e}");
                    }
                },
            }
        }

        if let Some(halt) = halt {
            return self.halt_chat(chat_id, halt, deleted).await;
        }

        let text = report_text(deleted, failed);
        info!("Cleanup: chat {chat_id}: {text}");
        match self
            .transport
            .send_text(chat_id, &text, SendOptions::silent())
            .await
        {
            Ok(sent) => {
                self.retain(TrackedMessage::new(sent.chat_id, sent.message_id, sent.timestamp))
                    .await?;
                Ok(ChatCleanupOutcome::Completed {
                    deleted,
                    failed,
                    report: Some(sent),
                })
            }
            Err(e) => match e.classify() {
                FailureClass::AccessLost => {
                    error!("Cleanup: failed to send report to chat {chat_id}: {e}");
                    self.halt_chat(chat_id, Halt::AccessLost, deleted).await
                }
                FailureClass::Migrated(to) => {
                    self.halt_chat(chat_id, Halt::Migrated(to), deleted).await
                }
                FailureClass::Transient => {
                    warn!("Cleanup: report for chat {chat_id} not sent: {e}");
                    Ok(ChatCleanupOutcome::Completed {
                        deleted,
                        failed,
                        report: None,
                    })
                }
            },
        }
    }

    async fn halt_chat(
        &self,
        chat_id: i64,
        halt: Halt,
        deleted: usize,
    ) -> Result<ChatCleanupOutcome, ChatSweepError> {
        match halt {
            Halt::AccessLost => {
                self.lifecycle.abandon(chat_id).await?;
                Ok(ChatCleanupOutcome::Abandoned { deleted })
            }
            Halt::Migrated(to) => {
                self.lifecycle.migrate(chat_id, to).await?;
                Ok(ChatCleanupOutcome::Migrated { to, deleted })
            }
        }
    }

    /// Cleans every active chat, then prunes whatever fell out of the window.
    ///
    /// Chats are taken from a snapshot, so abandonment during the sweep does
    /// not disturb iteration. One chat failing (error or panic) is logged and
    /// the sweep continues.
    pub async fn cleanup_all(&self, now: DateTime<Utc>) -> Result<GlobalCleanupSummary, ChatSweepError> {
        let chats = self.lifecycle.snapshot().await?;
        info!(
            "Global cleanup started for {} chat(s) on {}",
            chats.len(),
            self.transport_name()
        );

        let mut summary = GlobalCleanupSummary {
            chats: chats.len(),
            ..GlobalCleanupSummary::default()
        };
        for chat_id in chats {
            let engine = self.clone();
            let result =
                tokio::spawn(async move { engine.cleanup_chat(chat_id, now).await }).await;
            match result {
                Ok(Ok(outcome)) => match outcome {
                    ChatCleanupOutcome::Completed {
                        deleted, failed, ..
                    } => {
                        summary.deleted += deleted;
                        summary.failed += failed;
                    }
                    ChatCleanupOutcome::Abandoned { deleted } => {
                        summary.deleted += deleted;
                        summary.abandoned.push(chat_id);
                    }
                    ChatCleanupOutcome::Migrated { deleted, .. } => {
                        summary.deleted += deleted;
                    }
                },
                Ok(Err(e)) => {
                    error!("Global cleanup: chat {chat_id} failed: {e}. Continuing with other chats.");
                    summary.errored.push(chat_id);
                }
                Err(e) => {
                    error!("Global cleanup: chat {chat_id} task aborted: {e}. Continuing with other chats.");
                    summary.errored.push(chat_id);
                }
            }
        }

        let cutoff = retention::cutoff(now);
        summary.pruned =
            call_blocking(self.db.clone(), move |db| db.prune_older_than(cutoff)).await?;
        info!(
            "Global cleanup finished: chats={} deleted={} failed={} abandoned={} errored={} pruned={}",
            summary.chats,
            summary.deleted,
            summary.failed,
            summary.abandoned.len(),
            summary.errored.len(),
            summary.pruned
        );
        Ok(summary)
    }
}
