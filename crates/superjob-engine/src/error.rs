//! Error types for orchestration.

use superjob_tree::SubjobStatus;
use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur while dispatching or cascading subjobs.
#[derive(Debug, Error)]
pub enum EngineError {
  /// Reading or writing the subjob tree failed.
  #[error("store error: {0}")]
  Store(#[from] superjob_store::Error),

  /// A subjob's kind does not name any registered worker.
  #[error("subjob '{subjob_id}' names unknown worker '{worker}'")]
  UnknownWorker { subjob_id: String, worker: String },

  /// The execution backend refused an invocation.
  #[error("backend invocation failed for subjob '{subjob_id}'")]
  Backend {
    subjob_id: String,
    #[source]
    source: BackendError,
  },

  /// A completion or failure signal arrived for a subjob in the wrong state.
  #[error("cannot {operation} subjob '{subjob_id}' in status {status}")]
  UnexpectedStatus {
    subjob_id: String,
    operation: &'static str,
    status: SubjobStatus,
  },

  /// The superjob has no top-level subjobs to start.
  #[error("superjob '{0}' has no subjobs")]
  EmptySuperjob(String),
}
