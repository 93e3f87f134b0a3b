/// SQLite-backed durable history store.
///
/// Messages live in an append-only `messages` table keyed by an
/// autoincrement id; the rolling summary lives in `summaries` with one row
/// per conversation. Timestamps are stored as Unix milliseconds and clamped
/// so they never go backwards within a conversation.
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, info};

use chatrelay_core::{ChatMessage, MessageHandle, RelayError, Role, SummaryRecord};

use crate::store::HistoryStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS messages (
         id              INTEGER PRIMARY KEY AUTOINCREMENT,
         conversation_id TEXT NOT NULL,
         sender          TEXT NOT NULL,
         text            TEXT NOT NULL,
         created_at      INTEGER NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_messages_conversation
         ON messages(conversation_id, created_at, id);
     CREATE TABLE IF NOT EXISTS summaries (
         conversation_id TEXT PRIMARY KEY,
         summary_text    TEXT NOT NULL,
         last_updated    INTEGER NOT NULL,
         covered_through INTEGER
     );";

pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let conn = Connection::open(path.as_ref()).map_err(RelayError::store)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(RelayError::store)?;
        conn.execute_batch(SCHEMA).map_err(RelayError::store)?;
        add_coverage_column(&conn)?;

        info!("SqliteHistoryStore opened at {:?}", path.as_ref());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self, RelayError> {
        let conn = Connection::open_in_memory().map_err(RelayError::store)?;
        conn.execute_batch(SCHEMA).map_err(RelayError::store)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Distinct conversation ids, most recently active first.
    pub async fn list_conversations(&self) -> Result<Vec<String>, RelayError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT conversation_id FROM messages
                 GROUP BY conversation_id ORDER BY MAX(created_at) DESC",
            )
            .map_err(RelayError::store)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(RelayError::store)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(RelayError::store)?;
        Ok(ids)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(
        &self,
        conversation_id: &str,
        sender: Role,
        text: &str,
    ) -> Result<MessageHandle, RelayError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(RelayError::store)?;

        let last_ms: Option<i64> = tx
            .query_row(
                "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .map_err(RelayError::store)?;
        let created_ms = Utc::now().timestamp_millis().max(last_ms.unwrap_or(i64::MIN));

        tx.execute(
            "INSERT INTO messages (conversation_id, sender, text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, sender.as_str(), text, created_ms],
        )
        .map_err(RelayError::store)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(RelayError::store)?;

        debug!(id, sender = %sender, "Appended message");
        Ok(MessageHandle {
            id,
            conversation_id: conversation_id.to_string(),
            timestamp: millis_to_datetime(created_ms)?,
        })
    }

    async fn fetch_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RelayError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, sender, text, created_at FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(RelayError::store)?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut messages = stmt
            .query_map(params![conversation_id, limit], row_to_message)
            .map_err(RelayError::store)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(RelayError::store)?;

        // Newest-first from SQL; callers want oldest first.
        messages.reverse();
        Ok(messages)
    }

    async fn get_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<SummaryRecord>, RelayError> {
        let conn = self.conn.lock().await;
        let row: Option<(String, i64, Option<i64>)> = conn
            .query_row(
                "SELECT summary_text, last_updated, covered_through
                 FROM summaries WHERE conversation_id = ?1",
                params![conversation_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(RelayError::store)?;

        row.map(|(summary_text, last_updated, covered_through)| {
            Ok(SummaryRecord {
                conversation_id: conversation_id.to_string(),
                summary_text,
                last_updated: millis_to_datetime(last_updated)?,
                covered_through,
            })
        })
        .transpose()
    }

    async fn put_summary(
        &self,
        conversation_id: &str,
        summary_text: &str,
        timestamp: DateTime<Utc>,
        covered_through: Option<i64>,
    ) -> Result<(), RelayError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO summaries (conversation_id, summary_text, last_updated, covered_through)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(conversation_id) DO UPDATE SET
                 summary_text = excluded.summary_text,
                 last_updated = excluded.last_updated,
                 covered_through = excluded.covered_through",
            params![
                conversation_id,
                summary_text,
                timestamp.timestamp_millis(),
                covered_through
            ],
        )
        .map_err(RelayError::store)?;
        debug!("Stored summary for conversation");
        Ok(())
    }
}

/// Databases created before summaries tracked message coverage lack the
/// `covered_through` column.
fn add_coverage_column(conn: &Connection) -> Result<(), RelayError> {
    let present: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('summaries') WHERE name = 'covered_through'",
            [],
            |row| row.get(0),
        )
        .map_err(RelayError::store)?;
    if present == 0 {
        conn.execute_batch("ALTER TABLE summaries ADD COLUMN covered_through INTEGER;")
            .map_err(RelayError::store)?;
        info!("Added summaries.covered_through column");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row deserialization helpers
// ---------------------------------------------------------------------------

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<ChatMessage> {
    let id: i64 = row.get(0)?;
    let sender: String = row.get(1)?;
    let text: String = row.get(2)?;
    let created_at: i64 = row.get(3)?;

    let sender = sender.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(created_at)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(3, created_at))?;

    Ok(ChatMessage {
        id: Some(id),
        sender,
        text,
        timestamp,
    })
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, RelayError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| RelayError::StoreUnavailable(format!("timestamp out of range: {ms}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_append_and_fetch_order() {
        let store = SqliteHistoryStore::in_memory().expect("in-memory db");
        store.append("+1555", Role::User, "hello").await.unwrap();
        store.append("+1555", Role::Assistant, "hi there").await.unwrap();
        store.append("+1555", Role::User, "how are you").await.unwrap();

        let window = store.fetch_recent("+1555", 2).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].text, "hi there");
        assert_eq!(window[0].sender, Role::Assistant);
        assert_eq!(window[1].text, "how are you");
        assert!(window[0].timestamp <= window[1].timestamp);
        assert!(window[0].id < window[1].id);
    }

    #[tokio::test]
    async fn test_sqlite_handle_matches_fetched_row() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let handle = store.append("+1555", Role::User, "ping").await.unwrap();
        let window = store.fetch_recent("+1555", 10).await.unwrap();
        assert_eq!(window[0].id, Some(handle.id));
        assert_eq!(window[0].timestamp, handle.timestamp);
    }

    #[tokio::test]
    async fn test_sqlite_summary_upsert() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        assert!(store.get_summary("+1555").await.unwrap().is_none());

        store.put_summary("+1555", "old", Utc::now(), Some(2)).await.unwrap();
        store.put_summary("+1555", "new", Utc::now(), None).await.unwrap();

        let summary = store.get_summary("+1555").await.unwrap().unwrap();
        assert_eq!(summary.summary_text, "new");
        assert_eq!(summary.covered_through, None);

        let conn = store.conn.lock().await;
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM summaries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_sqlite_list_conversations() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store.append("a", Role::User, "one").await.unwrap();
        store.append("b", Role::User, "two").await.unwrap();
        store.append("a", Role::User, "three").await.unwrap();
        let ids = store.list_conversations().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a".to_string()));
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!(
            "chatrelay-test-{}.db",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        {
            let store = SqliteHistoryStore::open(&path).unwrap();
            store.append("+1555", Role::User, "remember me").await.unwrap();
        }
        let store = SqliteHistoryStore::open(&path).unwrap();
        let window = store.fetch_recent("+1555", 5).await.unwrap();
        assert_eq!(window[0].text, "remember me");
        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_sqlite_upgrades_summary_table_without_coverage() {
        let path = std::env::temp_dir().join(format!(
            "chatrelay-upgrade-{}.db",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE summaries (
                     conversation_id TEXT PRIMARY KEY,
                     summary_text    TEXT NOT NULL,
                     last_updated    INTEGER NOT NULL
                 );
                 INSERT INTO summaries VALUES ('+1555', 'legacy', 0);",
            )
            .unwrap();
        }

        let store = SqliteHistoryStore::open(&path).unwrap();
        let legacy = store.get_summary("+1555").await.unwrap().unwrap();
        assert_eq!(legacy.summary_text, "legacy");
        assert_eq!(legacy.covered_through, None);

        store.put_summary("+1555", "fresh", Utc::now(), Some(7)).await.unwrap();
        let fresh = store.get_summary("+1555").await.unwrap().unwrap();
        assert_eq!(fresh.covered_through, Some(7));

        drop(store);
        let _ = std::fs::remove_file(&path);
    }
}
