use std::path::Path;

use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use thiserror::Error;
use tracing::info;

use crate::event::Event;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store is not open")]
    Closed,
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("failed to encode or decode payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed => StoreError::Closed,
            other => StoreError::Database(other),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    topic: String,
    event_id: String,
    timestamp: String,
    source: String,
    payload: String,
}

impl EventRow {
    fn into_event(self) -> Result<Event, StoreError> {
        let payload: Map<String, Value> = serde_json::from_str(&self.payload)?;
        Ok(Event {
            topic: self.topic,
            event_id: self.event_id,
            timestamp: self.timestamp,
            source: self.source,
            payload,
        })
    }
}

/// Durable record of every distinct `(topic, event_id)` ever accepted.
///
/// The `UNIQUE (topic, event_id)` schema constraint is the deduplication
/// mechanism: `record_event` rides it with a conflict-ignoring insert, so
/// the first-sighting/duplicate classification stays correct across
/// restarts and under writers outside this process. Rows are never updated
/// or deleted.
#[derive(Clone)]
pub struct DedupStore {
    pool: Pool<Sqlite>,
}

impl DedupStore {
    /// Open or create the database at `path` and bootstrap the schema.
    /// Idempotent over an existing database. A failure here must abort
    /// startup before the service accepts any traffic.
    pub async fn open(path: &Path) -> anyhow::Result<DedupStore> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                event_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                payload TEXT NOT NULL,
                UNIQUE (topic, event_id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("dedup store open at {}", path.display());
        Ok(DedupStore { pool })
    }

    /// Insert the event unless its `(topic, event_id)` was already seen.
    /// Returns `true` on first sighting, `false` on duplicate. On duplicate
    /// nothing is overwritten, even if non-key fields differ. The check and
    /// the insert are one atomic statement.
    pub async fn record_event(&self, event: &Event) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(&event.payload)?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (topic, event_id, timestamp, source, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (topic, event_id) DO NOTHING
            "#,
        )
        .bind(&event.topic)
        .bind(&event.event_id)
        .bind(&event.timestamp)
        .bind(&event.source)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// All stored events in insertion order, optionally for one topic.
    /// Read/debug access only, not on the hot path.
    pub async fn list_events(&self, topic: Option<&str>) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = match topic {
            Some(topic) => {
                sqlx::query_as(
                    r#"
                    SELECT topic, event_id, timestamp, source, payload
                    FROM events WHERE topic = ? ORDER BY id
                    "#,
                )
                .bind(topic)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT topic, event_id, timestamp, source, payload
                    FROM events ORDER BY id
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(EventRow::into_event).collect()
    }

    pub async fn list_topics(&self) -> Result<Vec<String>, StoreError> {
        let topics = sqlx::query_scalar("SELECT DISTINCT topic FROM events ORDER BY topic")
            .fetch_all(&self.pool)
            .await?;
        Ok(topics)
    }

    /// Release the backing database. Safe to call more than once; any
    /// operation after this fails with `StoreError::Closed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
