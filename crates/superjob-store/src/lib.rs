//! Superjob Store
//!
//! This crate provides the storage trait and implementations for superjob
//! records and their subjob trees.
//!
//! The [`Store`] trait defines operations for:
//! - Creating superjobs and recording their terminal status
//! - Inserting and querying subjob trees (children, top-level chain, handles)
//! - Atomic per-subjob updates used by the orchestration engine
//!
//! Every write is visible to the next read by any caller. The compare-and-set
//! operations ([`Store::transition`], [`Store::queue`],
//! [`Store::mark_descendants_complete`]) report whether the caller's write won,
//! which is how the engine makes dispatch and propagation exactly-once without
//! holding locks of its own.

mod memory;
mod sqlite;

#[cfg(test)]
mod conformance;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use superjob_tree::{Subjob, SubjobStatus, Superjob, SuperjobStatus};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A record with the same id already exists.
  #[error("already exists: {0}")]
  AlreadyExists(String),

  /// The requested status change would move a subjob backward.
  #[error("invalid status transition: {from} -> {to}")]
  InvalidTransition { from: SubjobStatus, to: SubjobStatus },

  /// A persisted value could not be decoded.
  #[error("corrupt record: {0}")]
  Corrupt(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// The in-memory store lock was poisoned by a panicking writer.
  #[error("store lock poisoned")]
  LockPoisoned,
}

/// Storage trait for superjobs and subjob trees.
#[async_trait]
pub trait Store: Send + Sync {
  /// Create a new superjob record.
  async fn create_superjob(&self, superjob: &Superjob) -> Result<(), Error>;

  /// Get a superjob by ID.
  async fn get_superjob(&self, superjob_id: &str) -> Result<Superjob, Error>;

  /// Record a superjob's status.
  async fn update_superjob_status(
    &self,
    superjob_id: &str,
    status: SuperjobStatus,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
  ) -> Result<(), Error>;

  /// Insert a materialized subjob tree.
  async fn insert_subjobs(&self, subjobs: &[Subjob]) -> Result<(), Error>;

  /// Get a subjob by ID.
  async fn get_subjob(&self, subjob_id: &str) -> Result<Subjob, Error>;

  /// Resolve an execution backend handle back to its subjob.
  async fn find_by_handle(&self, job_handle: &str) -> Result<Subjob, Error>;

  /// Children of a subjob, ordered by position.
  async fn children(&self, parent_id: &str) -> Result<Vec<Subjob>, Error>;

  /// Parentless subjobs of a superjob, ordered by position.
  async fn top_level(&self, superjob_id: &str) -> Result<Vec<Subjob>, Error>;

  /// Every subjob of a superjob, in insertion order.
  async fn list_subjobs(&self, superjob_id: &str) -> Result<Vec<Subjob>, Error>;

  /// Delete every subjob of a superjob. Returns how many were removed.
  async fn delete_subjobs(&self, superjob_id: &str) -> Result<u64, Error>;

  /// Set `status = to` if the current status is one of `from`.
  ///
  /// Returns `false` when the current status is not in `from`.
  async fn transition(
    &self,
    subjob_id: &str,
    from: &[SubjobStatus],
    to: SubjobStatus,
  ) -> Result<bool, Error>;

  /// Move an `initialized` subjob to `queued` and store its handle in one write.
  ///
  /// Returns `false` when the subjob was not `initialized`.
  async fn queue(&self, subjob_id: &str, job_handle: &str) -> Result<bool, Error>;

  /// Flip `descendants_are_complete` from `false` to `true`.
  ///
  /// Returns `false` when the flag was already set.
  async fn mark_descendants_complete(&self, subjob_id: &str) -> Result<bool, Error>;
}

/// Reject compare-and-set requests that would break status monotonicity.
pub(crate) fn check_transition(from: &[SubjobStatus], to: SubjobStatus) -> Result<(), Error> {
  match from.iter().find(|status| !status.can_transition_to(to)) {
    Some(status) => Err(Error::InvalidTransition { from: *status, to }),
    None => Ok(()),
  }
}
