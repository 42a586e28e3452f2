use rusqlite::OptionalExtension;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};

use chatsweep_core::error::ChatSweepError;

pub const DB_FILE_NAME: &str = "chatsweep.db";

pub struct Database {
    conn: Mutex<Connection>,
}

pub async fn call_blocking<T, F>(db: std::sync::Arc<Database>, f: F) -> Result<T, ChatSweepError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T, ChatSweepError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(db.as_ref()))
        .await
        .map_err(|e| ChatSweepError::Task(format!("DB task join error: {e}")))?
}

/// Fixed-width UTC timestamp used for every stored instant, so that SQL
/// string comparison matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

const SCHEMA_VERSION_CURRENT: i64 = 1;

fn get_schema_version(conn: &Connection) -> Result<i64, ChatSweepError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS db_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM db_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|s| s.parse::<i64>().ok()).unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i64) -> Result<(), ChatSweepError> {
    conn.execute(
        "INSERT INTO db_meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![version.to_string()],
    )?;
    Ok(())
}

fn apply_schema_migrations(conn: &Connection) -> Result<(), ChatSweepError> {
    let version = get_schema_version(conn)?;
    if version > SCHEMA_VERSION_CURRENT {
        return Err(ChatSweepError::Config(format!(
            "database schema version {version} is newer than this build supports ({SCHEMA_VERSION_CURRENT})"
        )));
    }
    if version < SCHEMA_VERSION_CURRENT {
        set_schema_version(conn, SCHEMA_VERSION_CURRENT)?;
    }
    Ok(())
}

impl Database {
    pub(crate) fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn new(data_dir: &str) -> Result<Self, ChatSweepError> {
        let db_path = Path::new(data_dir).join(DB_FILE_NAME);
        std::fs::create_dir_all(data_dir)?;

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tracked_messages (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_tracked_messages_chat_timestamp
                ON tracked_messages(chat_id, timestamp);

            CREATE INDEX IF NOT EXISTS idx_tracked_messages_timestamp
                ON tracked_messages(timestamp);

            CREATE TABLE IF NOT EXISTS active_chats (
                chat_id INTEGER PRIMARY KEY,
                joined_at TEXT
            );

            CREATE TABLE IF NOT EXISTS chat_join_names (
                chat_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS db_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        apply_schema_migrations(&conn)?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_db() -> (Database, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("chatsweep_test_{}", uuid::Uuid::new_v4()));
        let db = Database::new(dir.to_str().unwrap()).unwrap();
        (db, dir)
    }

    pub(crate) fn cleanup(dir: &std::path::Path) {
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_new_database_creates_tables() {
        let (db, dir) = test_db();
        let conn = db.lock_conn();
        for table in ["tracked_messages", "active_chats", "chat_join_names", "db_meta"] {
            let found: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )
                .optional()
                .unwrap();
            assert_eq!(found.as_deref(), Some(table));
        }
        drop(conn);
        cleanup(&dir);
    }

    #[test]
    fn test_schema_version_is_tracked() {
        let (db, dir) = test_db();
        let conn = db.lock_conn();
        let version: String = conn
            .query_row(
                "SELECT value FROM db_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION_CURRENT.to_string());
        drop(conn);
        cleanup(&dir);
    }

    #[test]
    fn test_newer_schema_version_is_refused() {
        let (db, dir) = test_db();
        set_schema_version(&db.lock_conn(), SCHEMA_VERSION_CURRENT + 1).unwrap();
        drop(db);

        let err = match Database::new(dir.to_str().unwrap()) {
            Ok(_) => panic!("opened a database from a newer build"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("newer than this build supports"));
        cleanup(&dir);
    }

    #[test]
    fn test_reopen_preserves_state() {
        let (db, dir) = test_db();
        db.insert_active_chat(-42, Utc::now()).unwrap();
        drop(db);

        let reopened = Database::new(dir.to_str().unwrap()).unwrap();
        assert!(reopened.is_chat_active(-42).unwrap());
        cleanup(&dir);
    }

    #[test]
    fn test_timestamp_format_is_fixed_width_and_ordered() {
        let a = parse_timestamp("2026-01-01T09:00:00Z").unwrap();
        let b = parse_timestamp("2026-01-01T10:00:00.5Z").unwrap();
        let (fa, fb) = (format_timestamp(a), format_timestamp(b));
        assert_eq!(fa, "2026-01-01T09:00:00.000Z");
        assert_eq!(fb, "2026-01-01T10:00:00.500Z");
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert_eq!(parse_timestamp(&fb).unwrap(), b);
    }
}
