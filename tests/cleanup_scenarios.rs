//! End-to-end cleanup passes against an on-disk database and a scripted transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use chatsweep::cleanup::{report_text, ChatCleanupOutcome, CleanupEngine};
use chatsweep::db::Database;
use chatsweep::ledger::TrackedMessage;
use chatsweep::lifecycle::{ChatLifecycle, LifecycleEvent};
use chatsweep::transport::{SendOptions, SentMessage, Transport, TransportError};

#[derive(Default)]
struct ScriptedTransport {
    delete_results: HashMap<(i64, i64), Result<bool, TransportError>>,
    attempts: Mutex<Vec<(i64, i64)>>,
    reports: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        _options: SendOptions,
    ) -> Result<SentMessage, TransportError> {
        let mut reports = self.reports.lock().unwrap();
        reports.push((chat_id, text.to_string()));
        Ok(SentMessage {
            chat_id,
            message_id: 9000 + reports.len() as i64,
            timestamp: Utc::now(),
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool, TransportError> {
        self.attempts.lock().unwrap().push((chat_id, message_id));
        self.delete_results
            .get(&(chat_id, message_id))
            .cloned()
            .unwrap_or(Ok(true))
    }
}

struct Fixture {
    db: Arc<Database>,
    engine: CleanupEngine,
    lifecycle: ChatLifecycle,
    transport: Arc<ScriptedTransport>,
    dir: std::path::PathBuf,
}

impl Fixture {
    fn new(transport: ScriptedTransport) -> Self {
        let dir = std::env::temp_dir().join(format!("chatsweep_it_{}", uuid::Uuid::new_v4()));
        let db = Arc::new(Database::new(dir.to_str().unwrap()).unwrap());
        let transport = Arc::new(transport);
        let lifecycle = ChatLifecycle::new(db.clone());
        let engine = CleanupEngine::new(db.clone(), lifecycle.clone(), transport.clone());
        Fixture {
            db,
            engine,
            lifecycle,
            transport,
            dir,
        }
    }

    fn track(&self, chat_id: i64, message_id: i64, at: DateTime<Utc>) {
        self.db
            .upsert_message(&TrackedMessage::new(chat_id, message_id, at))
            .unwrap();
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

#[tokio::test]
async fn test_forbidden_on_second_message_abandons_without_report() {
    let mut transport = ScriptedTransport::default();
    transport.delete_results.insert(
        (100, 2),
        Err(TransportError::Forbidden("bot was kicked from the group chat".into())),
    );
    let f = Fixture::new(transport);
    let now = Utc::now();
    let t0 = now - Duration::hours(3);
    f.lifecycle
        .apply(LifecycleEvent::Joined(100), t0)
        .await
        .unwrap();
    f.track(100, 1, t0);
    f.track(100, 2, t0 + Duration::hours(1));

    let outcome = f.engine.cleanup_chat(100, now).await.unwrap();

    assert_eq!(outcome, ChatCleanupOutcome::Abandoned { deleted: 0 });
    // Newest first: message 2 is attempted before message 1.
    assert_eq!(*f.transport.attempts.lock().unwrap(), vec![(100, 2)]);
    assert!(f.transport.reports.lock().unwrap().is_empty());
    assert!(!f.lifecycle.is_active(100).await.unwrap());
    assert_eq!(f.db.count_messages(100).unwrap(), 0);
}

#[tokio::test]
async fn test_forbidden_on_older_message_keeps_newer_deletions() {
    let mut transport = ScriptedTransport::default();
    transport
        .delete_results
        .insert((100, 1), Err(TransportError::Forbidden("bot was blocked".into())));
    let f = Fixture::new(transport);
    let now = Utc::now();
    let t0 = now - Duration::hours(3);
    f.lifecycle.mark_joined(100, t0).await.unwrap();
    f.track(100, 1, t0);
    f.track(100, 2, t0 + Duration::hours(1));

    let outcome = f.engine.cleanup_chat(100, now).await.unwrap();

    assert_eq!(outcome, ChatCleanupOutcome::Abandoned { deleted: 1 });
    assert_eq!(
        *f.transport.attempts.lock().unwrap(),
        vec![(100, 2), (100, 1)]
    );
    assert!(f.transport.reports.lock().unwrap().is_empty());
    assert!(f.lifecycle.snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_chat_report_is_tracked() {
    let f = Fixture::new(ScriptedTransport::default());
    let now = Utc::now();
    f.lifecycle.mark_joined(200, now).await.unwrap();

    f.engine.cleanup_chat(200, now).await.unwrap();

    assert_eq!(
        *f.transport.reports.lock().unwrap(),
        vec![(200, report_text(0, 0))]
    );
    assert_eq!(
        report_text(0, 0),
        "Removed 0 recent messages. Failed to remove: 0."
    );
    assert_eq!(f.db.count_messages(200).unwrap(), 1);
}

#[tokio::test]
async fn test_daily_sweep_prunes_and_survives_restart() {
    let f = Fixture::new(ScriptedTransport::default());
    let now = Utc::now();
    f.lifecycle.mark_joined(-1, now).await.unwrap();
    f.track(-1, 10, now - Duration::days(3));
    f.track(-1, 11, now - Duration::minutes(5));

    let summary = f.engine.cleanup_all(now).await.unwrap();
    assert_eq!(summary.chats, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.pruned, 1);
    // The stale message was pruned, never attempted.
    assert_eq!(*f.transport.attempts.lock().unwrap(), vec![(-1, 11)]);

    // Membership and the tracked report survive reopening the store.
    let reopened = Database::new(f.dir.to_str().unwrap()).unwrap();
    assert_eq!(reopened.active_chat_ids().unwrap(), vec![-1]);
    assert_eq!(reopened.count_messages(-1).unwrap(), 1);
}
