//! Which tracked messages may still be deleted through the platform.
//!
//! Telegram refuses to delete messages older than 48 hours, so anything past
//! the window is pruned from the ledger instead of being attempted.

use chrono::{DateTime, Duration, Utc};

use chatsweep_storage::ledger::TrackedMessage;

pub const RETENTION_WINDOW_DAYS: i64 = 2;

pub fn retention_window() -> Duration {
    Duration::days(RETENTION_WINDOW_DAYS)
}

/// Messages at or before the cutoff can no longer be deleted.
pub fn cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - retention_window()
}

pub fn eligible_for_deletion(
    messages: Vec<TrackedMessage>,
    cutoff: DateTime<Utc>,
) -> Vec<TrackedMessage> {
    messages
        .into_iter()
        .filter(|m| m.timestamp > cutoff)
        .collect()
}
