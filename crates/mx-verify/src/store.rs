//! Read-only access to the interception endpoint's usage database.
//!
//! The endpoint persists one row per completed provider call in its
//! `stats` table, keyed by the correlation identifier it received in
//! `x-mx-request-call-id`. The write side belongs entirely to the
//! endpoint; this module only queries. Queries run on the blocking
//! pool with a fresh read-only connection per call.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use thiserror::Error;

/// One persisted usage row.
#[derive(Clone, Debug)]
pub struct UsageRecord {
    pub call_uuid: String,
    pub model: String,
    pub total_tokens: i64,
    pub cost_usd: f64,
}

/// Abbreviated row for recent-rows diagnostics.
#[derive(Clone, Debug)]
pub struct RecentRecord {
    pub call_uuid: String,
    pub created_at: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Handle to the usage database file.
#[derive(Clone, Debug)]
pub struct UsageStore {
    path: PathBuf,
}

impl UsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the usage row persisted under a correlation identifier.
    pub async fn find(&self, call_id: &str) -> Result<Option<UsageRecord>, StoreError> {
        let path = self.path.clone();
        let call_id = call_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<UsageRecord>, StoreError> {
            let conn = open_read_only(&path)?;
            let record = conn
                .query_row(
                    "SELECT call_uuid, model, total_tokens, cost_usd FROM stats WHERE call_uuid = ?1",
                    rusqlite::params![call_id],
                    |row| {
                        Ok(UsageRecord {
                            call_uuid: row.get(0)?,
                            model: row.get(1)?,
                            total_tokens: row.get(2)?,
                            cost_usd: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await?
    }

    /// Most recently written rows, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<RecentRecord>, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RecentRecord>, StoreError> {
            let conn = open_read_only(&path)?;
            let mut stmt = conn.prepare(
                "SELECT call_uuid, created_at FROM stats ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(rusqlite::params![limit], |row| {
                Ok(RecentRecord {
                    call_uuid: row.get(0)?,
                    created_at: row.get(1)?,
                })
            })?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await?
    }
}

fn open_read_only(path: &Path) -> Result<Connection, rusqlite::Error> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use rusqlite::Connection;

    pub fn create_stats_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE stats (
                call_uuid TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                total_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );",
        )
        .unwrap();
    }

    pub fn insert_row(
        path: &Path,
        call_uuid: &str,
        model: &str,
        total_tokens: i64,
        cost_usd: f64,
        created_at: &str,
    ) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "INSERT INTO stats (call_uuid, model, total_tokens, cost_usd, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![call_uuid, model, total_tokens, cost_usd, created_at],
        )
        .unwrap();
    }
}
