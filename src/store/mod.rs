use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
pub mod memory;
pub mod models;
use models::*;

/// Mutation applied to the local record inside [`Store::with_local_data`].
pub type LocalMutator<'a> = Box<dyn FnOnce(&mut LocalData) + Send + 'a>;

/// Notification history rows kept in the database.
pub const MAX_NOTIFICATION_HISTORY: i64 = 200;

const PARTITION_SYNC: &str = "sync";
const PARTITION_LOCAL: &str = "local";
const KEY_PREFERENCES: &str = "preferences";
const KEY_LOCAL_DATA: &str = "local_data";

/// Key/value persistence for preferences and polling state.
///
/// Both records are read and written whole. `with_local_data` is the single
/// place where the local record is read-modified-written.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_preferences(&self) -> Result<Preferences>;
    async fn save_preferences(&self, prefs: &Preferences) -> Result<()>;

    async fn get_local_data(&self) -> Result<LocalData>;
    async fn save_local_data(&self, data: &LocalData) -> Result<()>;

    /// Load the local record, apply `mutate`, save it back, and return the
    /// saved record.
    async fn with_local_data(&self, mutate: LocalMutator<'_>) -> Result<LocalData>;

    async fn record_notification(&self, record: &NotificationRecord) -> Result<()>;
    async fn recent_notifications(&self, limit: i64) -> Result<Vec<NotificationRecord>>;
}

/// Run `f` against the local record and hand back its result.
pub async fn update_local_data<R, F>(store: &dyn Store, f: F) -> Result<R>
where
    R: Send,
    F: FnOnce(&mut LocalData) -> R + Send,
{
    let mut out = None;
    store
        .with_local_data(Box::new(|data: &mut LocalData| out = Some(f(data))))
        .await?;
    out.ok_or_else(|| anyhow!("local data mutator did not run"))
}

/// SQLite-backed store (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {path}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }
}

// ── Key/value helpers ──────────────────────────────────────────────────────────

fn read_value<T: DeserializeOwned + Default>(
    conn: &Connection,
    partition: &str,
    key: &str,
) -> Result<T> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE partition=?1 AND key=?2",
            params![partition, key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(json) => serde_json::from_str(&json)
            .with_context(|| format!("Corrupt {partition}/{key} record")),
        None => Ok(T::default()),
    }
}

fn write_value<T: Serialize>(conn: &Connection, partition: &str, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO kv_store (partition, key, value, updated_at) VALUES (?1,?2,?3,?4)
         ON CONFLICT(partition, key) DO UPDATE SET
            value=excluded.value,
            updated_at=excluded.updated_at",
        params![partition, key, json, Utc::now()],
    )?;
    Ok(())
}

#[async_trait]
impl Store for Database {
    async fn get_preferences(&self) -> Result<Preferences> {
        let conn = self.lock()?;
        read_value(&conn, PARTITION_SYNC, KEY_PREFERENCES)
    }

    async fn save_preferences(&self, prefs: &Preferences) -> Result<()> {
        let conn = self.lock()?;
        write_value(&conn, PARTITION_SYNC, KEY_PREFERENCES, prefs)
    }

    async fn get_local_data(&self) -> Result<LocalData> {
        let conn = self.lock()?;
        read_value(&conn, PARTITION_LOCAL, KEY_LOCAL_DATA)
    }

    async fn save_local_data(&self, data: &LocalData) -> Result<()> {
        let conn = self.lock()?;
        write_value(&conn, PARTITION_LOCAL, KEY_LOCAL_DATA, data)
    }

    async fn with_local_data(&self, mutate: LocalMutator<'_>) -> Result<LocalData> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut data: LocalData = read_value(&tx, PARTITION_LOCAL, KEY_LOCAL_DATA)?;
        mutate(&mut data);
        write_value(&tx, PARTITION_LOCAL, KEY_LOCAL_DATA, &data)?;
        tx.commit()?;
        Ok(data)
    }

    async fn record_notification(&self, record: &NotificationRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO notifications (
                id, title, message, context, priority, dispatched_at
             ) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                record.id,
                record.title,
                record.message,
                record.context,
                record.priority,
                record.dispatched_at,
            ],
        )?;
        conn.execute(
            "DELETE FROM notifications WHERE rowid NOT IN (
                SELECT rowid FROM notifications ORDER BY dispatched_at DESC, rowid DESC LIMIT ?1
             )",
            params![MAX_NOTIFICATION_HISTORY],
        )?;
        Ok(())
    }

    async fn recent_notifications(&self, limit: i64) -> Result<Vec<NotificationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, message, context, priority, dispatched_at
             FROM notifications ORDER BY dispatched_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], map_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_notification(row: &rusqlite::Row) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        message: row.get(2)?,
        context: row.get(3)?,
        priority: row.get(4)?,
        dispatched_at: row.get(5)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    partition   TEXT    NOT NULL,
    key         TEXT    NOT NULL,
    value       TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL,
    PRIMARY KEY (partition, key)
);

CREATE TABLE IF NOT EXISTS notifications (
    id            TEXT    PRIMARY KEY,
    title         TEXT    NOT NULL,
    message       TEXT    NOT NULL,
    context       TEXT,
    priority      INTEGER NOT NULL,
    dispatched_at TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_dispatched ON notifications(dispatched_at);
"#;
