use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::backend::DraftBackend;
use crate::error::{StoreError, StoreResult};
use crate::record::HistoryRecord;

const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
      version INTEGER PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS obs_translations (
      key TEXT PRIMARY KEY,
      story_num TEXT NOT NULL,
      language TEXT NOT NULL,
      last_edited TEXT NOT NULL,
      created_at TEXT NOT NULL,
      content TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_obs_translations_story ON obs_translations(story_num);
    CREATE INDEX IF NOT EXISTS idx_obs_translations_language ON obs_translations(language);
    CREATE INDEX IF NOT EXISTS idx_obs_translations_last_edited ON obs_translations(last_edited);
    CREATE INDEX IF NOT EXISTS idx_obs_translations_created_at ON obs_translations(created_at);
    "#];

const SELECT_RECORD: &str =
    "SELECT key, story_num, language, last_edited, created_at, content FROM obs_translations";

/// Drafts kept in a SQLite database file.
///
/// Content is stored as JSON text next to the indexed key columns. Queries run
/// on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_connection<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("draft database lock poisoned".into()))?;
            op(&guard)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

#[async_trait]
impl DraftBackend for SqliteBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<HistoryRecord>> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            let row = conn
                .query_row(
                    &format!("{SELECT_RECORD} WHERE key = ?1"),
                    params![key],
                    read_row,
                )
                .optional()?;
            row.map(decode_row).transpose()
        })
        .await
    }

    async fn put(&self, record: &HistoryRecord) -> StoreResult<()> {
        let record = record.clone();
        self.with_connection(move |conn| {
            let content = serde_json::to_string(&record.content)?;
            conn.execute(
                r#"
                INSERT INTO obs_translations (key, story_num, language, last_edited, created_at, content)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(key) DO UPDATE SET
                  story_num = excluded.story_num,
                  language = excluded.language,
                  last_edited = excluded.last_edited,
                  created_at = excluded.created_at,
                  content = excluded.content
                "#,
                params![
                    record.key,
                    record.story_num,
                    record.language,
                    record.last_edited,
                    record.created_at,
                    content,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn all(&self) -> StoreResult<Vec<HistoryRecord>> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare(SELECT_RECORD)?;
            let rows = statement.query_map([], read_row)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(decode_row(row?)?);
            }
            Ok(records)
        })
        .await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM obs_translations", [])?;
            Ok(())
        })
        .await
    }
}

fn apply_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(MIGRATIONS[0])?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version) VALUES (1)",
        [],
    )?;
    Ok(())
}

struct RawRecord {
    key: String,
    story_num: String,
    language: String,
    last_edited: DateTime<Utc>,
    created_at: DateTime<Utc>,
    content: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        key: row.get(0)?,
        story_num: row.get(1)?,
        language: row.get(2)?,
        last_edited: row.get(3)?,
        created_at: row.get(4)?,
        content: row.get(5)?,
    })
}

fn decode_row(raw: RawRecord) -> StoreResult<HistoryRecord> {
    Ok(HistoryRecord {
        key: raw.key,
        story_num: raw.story_num,
        language: raw.language,
        last_edited: raw.last_edited,
        created_at: raw.created_at,
        content: serde_json::from_str(&raw.content)?,
    })
}
