//! Workflow-level handlers.
//!
//! The engine calls a [`WorkflowHandler`] exactly when a superjob's top-level
//! chain is exhausted, and once per subjob failure. What happens next (abort
//! everything, keep going, retry) is the handler's decision.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use superjob_store::Store;
use superjob_tree::SuperjobStatus;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::EngineError;

/// Receives superjob-level outcomes from the engine.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
  /// Every subjob of the superjob has finished.
  async fn on_workflow_complete(&self, superjob_id: &str) -> Result<(), EngineError>;

  /// A subjob failed. `item` is the backend job item that failed.
  async fn on_workflow_error(
    &self,
    superjob_id: &str,
    worker: &str,
    item: &serde_json::Value,
    cause: &str,
  ) -> Result<(), EngineError>;
}

/// Events emitted by [`ChannelHandler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowEvent {
  Completed {
    superjob_id: String,
  },
  Failed {
    superjob_id: String,
    worker: String,
    item: serde_json::Value,
    cause: String,
  },
}

/// A handler that discards every outcome.
#[derive(Debug, Clone, Default)]
pub struct NoopHandler;

#[async_trait]
impl WorkflowHandler for NoopHandler {
  async fn on_workflow_complete(&self, _superjob_id: &str) -> Result<(), EngineError> {
    Ok(())
  }

  async fn on_workflow_error(
    &self,
    _superjob_id: &str,
    _worker: &str,
    _item: &serde_json::Value,
    _cause: &str,
  ) -> Result<(), EngineError> {
    Ok(())
  }
}

/// A handler that forwards outcomes to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
  sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelHandler {
  pub fn new(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
    Self { sender }
  }
}

#[async_trait]
impl WorkflowHandler for ChannelHandler {
  async fn on_workflow_complete(&self, superjob_id: &str) -> Result<(), EngineError> {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(WorkflowEvent::Completed {
      superjob_id: superjob_id.to_string(),
    });
    Ok(())
  }

  async fn on_workflow_error(
    &self,
    superjob_id: &str,
    worker: &str,
    item: &serde_json::Value,
    cause: &str,
  ) -> Result<(), EngineError> {
    let _ = self.sender.send(WorkflowEvent::Failed {
      superjob_id: superjob_id.to_string(),
      worker: worker.to_string(),
      item: item.clone(),
      cause: cause.to_string(),
    });
    Ok(())
  }
}

/// Records superjob outcomes in the store, then forwards them.
///
/// On completion the superjob is marked `complete` and, when
/// `delete_subjobs` is set, its subjobs are deleted. On failure the superjob
/// is marked `failed` with the cause.
pub struct StoreHandler<H> {
  store: Arc<dyn Store>,
  delete_subjobs: bool,
  inner: H,
}

impl<H: WorkflowHandler> StoreHandler<H> {
  pub fn new(store: Arc<dyn Store>, delete_subjobs: bool, inner: H) -> Self {
    Self {
      store,
      delete_subjobs,
      inner,
    }
  }
}

#[async_trait]
impl<H: WorkflowHandler> WorkflowHandler for StoreHandler<H> {
  async fn on_workflow_complete(&self, superjob_id: &str) -> Result<(), EngineError> {
    self
      .store
      .update_superjob_status(
        superjob_id,
        SuperjobStatus::Complete,
        Some(chrono::Utc::now()),
        None,
      )
      .await?;

    if self.delete_subjobs {
      let deleted = self.store.delete_subjobs(superjob_id).await?;
      info!(superjob_id = %superjob_id, deleted, "subjobs deleted");
    }

    info!(superjob_id = %superjob_id, "superjob_completed");
    self.inner.on_workflow_complete(superjob_id).await
  }

  async fn on_workflow_error(
    &self,
    superjob_id: &str,
    worker: &str,
    item: &serde_json::Value,
    cause: &str,
  ) -> Result<(), EngineError> {
    self
      .store
      .update_superjob_status(
        superjob_id,
        SuperjobStatus::Failed,
        Some(chrono::Utc::now()),
        Some(format!("{}: {}", worker, cause)),
      )
      .await?;

    error!(
      superjob_id = %superjob_id,
      worker = %worker,
      cause = %cause,
      "superjob_failed"
    );
    self
      .inner
      .on_workflow_error(superjob_id, worker, item, cause)
      .await
  }
}
