//! Error reporter.
//!
//! A failed subjob halts its own branch. Nothing is propagated to siblings or
//! parents; the workflow handler decides what the superjob does next.

use superjob_tree::SubjobStatus;
use tracing::{debug, error};

use crate::engine::Engine;
use crate::error::EngineError;

impl Engine {
  /// Record a backend failure and forward it to the workflow handler.
  ///
  /// Only `queued` or `running` subjobs can fail, so a repeated report for
  /// the same subjob is rejected instead of being forwarded twice.
  pub async fn fail(
    &self,
    subjob_id: &str,
    worker: &str,
    item: serde_json::Value,
    cause: &str,
  ) -> Result<(), EngineError> {
    let failed = self
      .store
      .transition(
        subjob_id,
        &[SubjobStatus::Queued, SubjobStatus::Running],
        SubjobStatus::Failed,
      )
      .await?;

    let subjob = self.store.get_subjob(subjob_id).await?;
    if !failed {
      return Err(EngineError::UnexpectedStatus {
        subjob_id: subjob.subjob_id,
        operation: "fail",
        status: subjob.status,
      });
    }

    debug!(
      subjob_id = %subjob.subjob_id,
      superjob_id = %subjob.superjob_id,
      "{}: error", subjob
    );
    error!(
      subjob_id = %subjob.subjob_id,
      superjob_id = %subjob.superjob_id,
      worker = %worker,
      cause = %cause,
      "subjob_failed"
    );

    self
      .handler
      .on_workflow_error(&subjob.superjob_id, worker, &item, cause)
      .await
  }
}
