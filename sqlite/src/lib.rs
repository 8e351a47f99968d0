//! SQLite-backed session store.
//!
//! Persists session records in a single table keyed by id, with an index on
//! the idle deadline so the periodic expiry sweep is a ranged delete rather
//! than a table scan. Deadlines are stored as integer unix microseconds:
//! sortable without string gymnastics and exactly round-trippable.
//!
//! # Example
//!
//! ```ignore
//! use sessionware_sqlite::SqliteStore;
//! use sqlx::sqlite::SqlitePoolOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = SqlitePoolOptions::new().connect("sqlite://sessions.db").await?;
//! let store = SqliteStore::new(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sessionware_core::{Result, SessionError, SessionId, SessionRecord, SessionStore};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;

/// [`SessionStore`] persisting records in a SQLite database.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the sessions table and its idle-deadline index if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the DDL fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                idle_deadline INTEGER NOT NULL,
                absolute_deadline INTEGER NOT NULL,
                data BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(SessionError::store)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS sessions_idle_deadline
             ON sessions (idle_deadline)",
        )
        .execute(&self.pool)
        .await
        .map_err(SessionError::store)?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        // Idle-expired rows count as not-found even before a sweep ran.
        let row = sqlx::query(
            "SELECT id, idle_deadline, absolute_deadline, data
             FROM sessions
             WHERE id = ?1 AND idle_deadline > ?2",
        )
        .bind(id.as_str())
        .bind(Utc::now().timestamp_micros())
        .fetch_optional(&self.pool)
        .await
        .map_err(SessionError::store)?;

        row.map(record_from_row).transpose()
    }

    async fn save(&self, record: &SessionRecord) -> Result<()> {
        if record.is_expired_at(Utc::now()) {
            return Ok(());
        }
        // The upsert refreshes the sliding deadline and the payload only;
        // the absolute deadline stays what it was at creation or renewal.
        sqlx::query(
            "INSERT INTO sessions (id, idle_deadline, absolute_deadline, data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 idle_deadline = excluded.idle_deadline,
                 data = excluded.data",
        )
        .bind(record.id.as_str())
        .bind(record.idle_deadline.timestamp_micros())
        .bind(record.absolute_deadline.timestamp_micros())
        .bind(record.data.as_slice())
        .execute(&self.pool)
        .await
        .map_err(SessionError::store)?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(SessionError::store)?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE idle_deadline <= ?1")
            .bind(Utc::now().timestamp_micros())
            .execute(&self.pool)
            .await
            .map_err(SessionError::store)?;
        if result.rows_affected() > 0 {
            debug!(removed = result.rows_affected(), "swept expired session rows");
        }
        Ok(())
    }
}

fn record_from_row(row: SqliteRow) -> Result<SessionRecord> {
    let id: String = row.try_get("id").map_err(SessionError::store)?;
    let idle_deadline: i64 = row.try_get("idle_deadline").map_err(SessionError::store)?;
    let absolute_deadline: i64 = row
        .try_get("absolute_deadline")
        .map_err(SessionError::store)?;
    let data: Vec<u8> = row.try_get("data").map_err(SessionError::store)?;

    Ok(SessionRecord {
        id: SessionId::from(id),
        idle_deadline: from_micros(idle_deadline)?,
        absolute_deadline: from_micros(absolute_deadline)?,
        data,
    })
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| SessionError::Store(format!("stored timestamp out of range: {micros}")))
}
