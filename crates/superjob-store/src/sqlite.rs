//! SQLite store.
//!
//! Each compare-and-set is a single guarded `UPDATE` judged by
//! `rows_affected`, so concurrent callers cannot both win.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{
  SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use superjob_tree::{Subjob, SubjobKind, SubjobStatus, Superjob, SuperjobStatus};

use crate::{Error, Store, check_transition};

const SCHEMA: [&str; 4] = [
  "CREATE TABLE IF NOT EXISTS superjobs (
    superjob_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    error TEXT
  )",
  "CREATE TABLE IF NOT EXISTS subjobs (
    subjob_id TEXT PRIMARY KEY,
    superjob_id TEXT NOT NULL,
    parent_id TEXT,
    next_id TEXT,
    position INTEGER NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    descendants_are_complete INTEGER NOT NULL DEFAULT 0,
    job_handle TEXT UNIQUE,
    arguments TEXT NOT NULL,
    metadata TEXT NOT NULL
  )",
  "CREATE INDEX IF NOT EXISTS idx_subjobs_superjob ON subjobs (superjob_id, parent_id, position)",
  "CREATE INDEX IF NOT EXISTS idx_subjobs_parent ON subjobs (parent_id, position)",
];

const SUBJOB_COLUMNS: &str = "subjob_id, superjob_id, parent_id, next_id, position, kind, status, \
   descendants_are_complete, job_handle, arguments, metadata";

/// A [`Store`] backed by SQLite through sqlx.
#[derive(Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Open (creating if missing) the database at `database_url` and ensure the schema.
  pub async fn connect(database_url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
      .journal_mode(SqliteJournalMode::Wal)
      .busy_timeout(Duration::from_secs(5))
      .create_if_missing(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Self::with_pool(pool).await
  }

  /// A private in-memory database, kept alive on a single connection.
  pub async fn connect_in_memory() -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .min_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect_with(options)
      .await?;
    Self::with_pool(pool).await
  }

  /// Wrap an existing pool and ensure the schema.
  pub async fn with_pool(pool: SqlitePool) -> Result<Self, Error> {
    for statement in SCHEMA {
      sqlx::query(statement).execute(&pool).await?;
    }
    Ok(Self { pool })
  }

  async fn ensure_subjob(&self, subjob_id: &str) -> Result<(), Error> {
    let found = sqlx::query("SELECT 1 FROM subjobs WHERE subjob_id = ?")
      .bind(subjob_id)
      .fetch_optional(&self.pool)
      .await?;
    match found {
      Some(_) => Ok(()),
      None => Err(Error::NotFound(format!("subjob {}", subjob_id))),
    }
  }

  async fn fetch_subjobs(&self, sql: &str, key: &str) -> Result<Vec<Subjob>, Error> {
    let rows = sqlx::query(sql).bind(key).fetch_all(&self.pool).await?;
    rows.iter().map(subjob_from_row).collect()
  }
}

fn corrupt(column: &str, e: impl std::fmt::Display) -> Error {
  Error::Corrupt(format!("{}: {}", column, e))
}

fn superjob_from_row(row: &SqliteRow) -> Result<Superjob, Error> {
  let status: String = row.try_get("status")?;
  Ok(Superjob {
    superjob_id: row.try_get("superjob_id")?,
    name: row.try_get("name")?,
    status: SuperjobStatus::from_str(&status).map_err(|e| corrupt("status", e))?,
    created_at: row.try_get("created_at")?,
    completed_at: row.try_get("completed_at")?,
    error: row.try_get("error")?,
  })
}

fn subjob_from_row(row: &SqliteRow) -> Result<Subjob, Error> {
  let status: String = row.try_get("status")?;
  let kind: String = row.try_get("kind")?;
  let position: i64 = row.try_get("position")?;
  let arguments: String = row.try_get("arguments")?;
  let metadata: String = row.try_get("metadata")?;

  Ok(Subjob {
    subjob_id: row.try_get("subjob_id")?,
    superjob_id: row.try_get("superjob_id")?,
    parent_id: row.try_get("parent_id")?,
    next_id: row.try_get("next_id")?,
    position: u32::try_from(position).map_err(|e| corrupt("position", e))?,
    kind: SubjobKind::from(kind),
    status: SubjobStatus::from_str(&status).map_err(|e| corrupt("status", e))?,
    descendants_are_complete: row.try_get("descendants_are_complete")?,
    job_handle: row.try_get("job_handle")?,
    arguments: serde_json::from_str(&arguments).map_err(|e| corrupt("arguments", e))?,
    metadata: serde_json::from_str(&metadata).map_err(|e| corrupt("metadata", e))?,
  })
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_superjob(&self, superjob: &Superjob) -> Result<(), Error> {
    sqlx::query(
      "INSERT INTO superjobs (superjob_id, name, status, created_at, completed_at, error)
       VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&superjob.superjob_id)
    .bind(&superjob.name)
    .bind(superjob.status.as_str())
    .bind(superjob.created_at)
    .bind(superjob.completed_at)
    .bind(&superjob.error)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn get_superjob(&self, superjob_id: &str) -> Result<Superjob, Error> {
    let row = sqlx::query("SELECT * FROM superjobs WHERE superjob_id = ?")
      .bind(superjob_id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| Error::NotFound(format!("superjob {}", superjob_id)))?;
    superjob_from_row(&row)
  }

  async fn update_superjob_status(
    &self,
    superjob_id: &str,
    status: SuperjobStatus,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      "UPDATE superjobs SET status = ?, completed_at = ?, error = ? WHERE superjob_id = ?",
    )
    .bind(status.as_str())
    .bind(completed_at)
    .bind(error)
    .bind(superjob_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("superjob {}", superjob_id)));
    }
    Ok(())
  }

  async fn insert_subjobs(&self, subjobs: &[Subjob]) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    for subjob in subjobs {
      sqlx::query(&format!(
        "INSERT INTO subjobs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        SUBJOB_COLUMNS
      ))
      .bind(&subjob.subjob_id)
      .bind(&subjob.superjob_id)
      .bind(&subjob.parent_id)
      .bind(&subjob.next_id)
      .bind(i64::from(subjob.position))
      .bind(subjob.kind.as_str())
      .bind(subjob.status.as_str())
      .bind(subjob.descendants_are_complete)
      .bind(&subjob.job_handle)
      .bind(subjob.arguments.to_string())
      .bind(subjob.metadata.to_string())
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn get_subjob(&self, subjob_id: &str) -> Result<Subjob, Error> {
    let row = sqlx::query(&format!(
      "SELECT {} FROM subjobs WHERE subjob_id = ?",
      SUBJOB_COLUMNS
    ))
    .bind(subjob_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("subjob {}", subjob_id)))?;
    subjob_from_row(&row)
  }

  async fn find_by_handle(&self, job_handle: &str) -> Result<Subjob, Error> {
    let row = sqlx::query(&format!(
      "SELECT {} FROM subjobs WHERE job_handle = ?",
      SUBJOB_COLUMNS
    ))
    .bind(job_handle)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("job handle {}", job_handle)))?;
    subjob_from_row(&row)
  }

  async fn children(&self, parent_id: &str) -> Result<Vec<Subjob>, Error> {
    let sql = format!(
      "SELECT {} FROM subjobs WHERE parent_id = ? ORDER BY position, rowid",
      SUBJOB_COLUMNS
    );
    self.fetch_subjobs(&sql, parent_id).await
  }

  async fn top_level(&self, superjob_id: &str) -> Result<Vec<Subjob>, Error> {
    let sql = format!(
      "SELECT {} FROM subjobs WHERE superjob_id = ? AND parent_id IS NULL ORDER BY position, rowid",
      SUBJOB_COLUMNS
    );
    self.fetch_subjobs(&sql, superjob_id).await
  }

  async fn list_subjobs(&self, superjob_id: &str) -> Result<Vec<Subjob>, Error> {
    let sql = format!(
      "SELECT {} FROM subjobs WHERE superjob_id = ? ORDER BY rowid",
      SUBJOB_COLUMNS
    );
    self.fetch_subjobs(&sql, superjob_id).await
  }

  async fn delete_subjobs(&self, superjob_id: &str) -> Result<u64, Error> {
    let result = sqlx::query("DELETE FROM subjobs WHERE superjob_id = ?")
      .bind(superjob_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected())
  }

  async fn transition(
    &self,
    subjob_id: &str,
    from: &[SubjobStatus],
    to: SubjobStatus,
  ) -> Result<bool, Error> {
    check_transition(from, to)?;
    if from.is_empty() {
      self.ensure_subjob(subjob_id).await?;
      return Ok(false);
    }

    let placeholders = vec!["?"; from.len()].join(", ");
    let sql = format!(
      "UPDATE subjobs SET status = ? WHERE subjob_id = ? AND status IN ({})",
      placeholders
    );
    let mut query = sqlx::query(&sql).bind(to.as_str()).bind(subjob_id);
    for status in from {
      query = query.bind(status.as_str());
    }

    let result = query.execute(&self.pool).await?;
    if result.rows_affected() == 0 {
      self.ensure_subjob(subjob_id).await?;
      return Ok(false);
    }
    Ok(true)
  }

  async fn queue(&self, subjob_id: &str, job_handle: &str) -> Result<bool, Error> {
    let result = sqlx::query(
      "UPDATE subjobs SET status = ?, job_handle = ? WHERE subjob_id = ? AND status = ?",
    )
    .bind(SubjobStatus::Queued.as_str())
    .bind(job_handle)
    .bind(subjob_id)
    .bind(SubjobStatus::Initialized.as_str())
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      self.ensure_subjob(subjob_id).await?;
      return Ok(false);
    }
    Ok(true)
  }

  async fn mark_descendants_complete(&self, subjob_id: &str) -> Result<bool, Error> {
    let result = sqlx::query(
      "UPDATE subjobs SET descendants_are_complete = 1
       WHERE subjob_id = ? AND descendants_are_complete = 0",
    )
    .bind(subjob_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      self.ensure_subjob(subjob_id).await?;
      return Ok(false);
    }
    Ok(true)
  }
}
