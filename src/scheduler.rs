use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::cleanup::{ChatCleanupOutcome, CleanupEngine};
use crate::error::ChatSweepError;

/// Runs one cleanup for `chat_id` after `delay`.
///
/// The delay lets the platform finish handling the triggering command before
/// the pass deletes it.
pub fn schedule_chat_cleanup(
    engine: CleanupEngine,
    chat_id: i64,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match engine.cleanup_chat(chat_id, Utc::now()).await {
            Ok(ChatCleanupOutcome::Completed {
                deleted, failed, ..
            }) => {
                info!("Scheduler: chat {chat_id} cleaned (deleted={deleted}, failed={failed})");
            }
            Ok(outcome) => info!("Scheduler: chat {chat_id} cleanup ended early: {outcome:?}"),
            Err(e) => error!("Scheduler: cleanup for chat {chat_id} failed: {e}"),
        }
    })
}

pub fn daily_schedule(at: NaiveTime) -> Result<cron::Schedule, ChatSweepError> {
    let expr = format!("0 {} {} * * *", at.minute(), at.hour());
    cron::Schedule::from_str(&expr)
        .map_err(|e| ChatSweepError::Config(format!("invalid daily schedule '{expr}': {e}")))
}

pub fn next_daily_run(schedule: &cron::Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&now).next()
}

/// Next run strictly after both `now` and the last fired slot, so a clock
/// that reads slightly behind the slot it just woke for cannot fire it twice.
pub fn next_daily_run_after(
    schedule: &cron::Schedule,
    now: DateTime<Utc>,
    last_fired: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let from = last_fired.map_or(now, |last| now.max(last));
    next_daily_run(schedule, from)
}

/// Starts the daily global sweep. Nothing is spawned when `at` is `None`.
pub fn spawn_daily_cleanup(
    engine: CleanupEngine,
    at: Option<NaiveTime>,
) -> Result<Option<JoinHandle<()>>, ChatSweepError> {
    let Some(at) = at else {
        info!("Daily cleanup disabled (no cleanup_time configured)");
        return Ok(None);
    };
    let schedule = daily_schedule(at)?;
    let handle = tokio::spawn(async move {
        info!("Daily cleanup scheduled at {} UTC", at.format("%H:%M"));
        let mut last_fired: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let Some(next) = next_daily_run_after(&schedule, now, last_fired) else {
                warn!("Daily cleanup: schedule has no upcoming run, stopping");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!("Daily cleanup: next run at {}", next.to_rfc3339());
            tokio::time::sleep(wait).await;
            last_fired = Some(next);

            if let Err(e) = engine.cleanup_all(Utc::now()).await {
                error!("Daily cleanup failed: {e}");
            }
        }
    });
    Ok(Some(handle))
}
