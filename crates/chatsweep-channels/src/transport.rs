use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The bot has no standing in the chat any more (kicked, blocked, chat gone).
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request timed out")]
    TimedOut,

    #[error("network error: {0}")]
    Network(String),

    #[error("chat migrated to {new_chat_id}")]
    ChatMigrated { new_chat_id: i64 },

    #[error("rate limited, retry after {0}s")]
    RetryAfter(u64),

    #[error("{0}")]
    Other(String),
}

/// How the cleanup core reacts to a failed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Permanent: abandon the chat, never retry.
    AccessLost,
    /// The chat now lives under another identifier.
    Migrated(i64),
    /// Count as a failure and carry on with the next item.
    Transient,
}

impl TransportError {
    pub fn classify(&self) -> FailureClass {
        match self {
            TransportError::Forbidden(_) => FailureClass::AccessLost,
            TransportError::ChatMigrated { new_chat_id } => FailureClass::Migrated(*new_chat_id),
            TransportError::BadRequest(_)
            | TransportError::TimedOut
            | TransportError::Network(_)
            | TransportError::RetryAfter(_)
            | TransportError::Other(_) => FailureClass::Transient,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub disable_notification: bool,
}

impl SendOptions {
    pub fn silent() -> Self {
        SendOptions {
            disable_notification: true,
        }
    }
}

/// A message the transport confirmed as sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Unique name, used in logs: "telegram".
    fn name(&self) -> &str;

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> Result<SentMessage, TransportError>;

    /// `Ok(false)` means the provider declined without giving a reason.
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool, TransportError>;
}
