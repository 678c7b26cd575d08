//! The orchestration engine.
//!
//! `Engine` holds the injected collaborators. The dispatcher, cascade and
//! reporter operations are implemented on it in their own modules.

use std::sync::Arc;

use superjob_store::Store;
use tracing::{info, instrument};

use crate::backend::ExecutionBackend;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::handler::WorkflowHandler;
use crate::registry::WorkerRegistry;

/// Drives subjob trees through dispatch, completion and failure.
///
/// The engine keeps no subjob state of its own. Every operation re-reads
/// what it needs from the store, and the store's compare-and-set operations
/// decide which of several concurrent callers acts.
pub struct Engine {
  pub(crate) store: Arc<dyn Store>,
  pub(crate) backend: Arc<dyn ExecutionBackend>,
  pub(crate) registry: Arc<WorkerRegistry>,
  pub(crate) handler: Arc<dyn WorkflowHandler>,
  pub(crate) config: EngineConfig,
}

impl Engine {
  pub fn new(
    store: Arc<dyn Store>,
    backend: Arc<dyn ExecutionBackend>,
    registry: Arc<WorkerRegistry>,
    handler: Arc<dyn WorkflowHandler>,
    config: EngineConfig,
  ) -> Self {
    Self {
      store,
      backend,
      registry,
      handler,
      config,
    }
  }

  /// Start a materialized superjob by enqueueing its first top-level subjob.
  #[instrument(name = "superjob_start", skip_all, fields(superjob_id = %superjob_id))]
  pub async fn start(&self, superjob_id: &str) -> Result<Option<String>, EngineError> {
    let top_level = self.store.top_level(superjob_id).await?;
    let first = top_level
      .first()
      .ok_or_else(|| EngineError::EmptySuperjob(superjob_id.to_string()))?;

    info!(superjob_id = %superjob_id, top_level = top_level.len(), "superjob_started");
    self.enqueue(&first.subjob_id).await
  }

  /// Backend success callback.
  #[instrument(name = "subjob_succeeded", skip_all, fields(job_handle = %job_handle))]
  pub async fn complete_by_handle(&self, job_handle: &str) -> Result<(), EngineError> {
    let subjob = self.store.find_by_handle(job_handle).await?;
    self.complete(&subjob.subjob_id).await
  }

  /// Backend failure callback.
  #[instrument(
    name = "subjob_failed",
    skip_all,
    fields(job_handle = %job_handle, worker = %worker)
  )]
  pub async fn fail_by_handle(
    &self,
    job_handle: &str,
    worker: &str,
    item: serde_json::Value,
    cause: &str,
  ) -> Result<(), EngineError> {
    let subjob = self.store.find_by_handle(job_handle).await?;
    self.fail(&subjob.subjob_id, worker, item, cause).await
  }
}
