//! Dispatcher.
//!
//! Decides how a subjob is started based on its resolved kind. Every path
//! begins with a compare-and-set away from `initialized`, so enqueueing is
//! safe to call speculatively: a subjob that is already under way is left
//! alone and no handle is returned.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use superjob_tree::{Subjob, SubjobStatus};
use tracing::{debug, warn};

use crate::backend::Invocation;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::registry::{Resolved, WorkerDescriptor};

impl Engine {
  /// Start a subjob. Returns the backend handle for leaf subjobs, the first
  /// child's handle for fan-outs, and `None` when nothing was started.
  pub fn enqueue<'a>(
    &'a self,
    subjob_id: &'a str,
  ) -> BoxFuture<'a, Result<Option<String>, EngineError>> {
    async move {
      let subjob = self.store.get_subjob(subjob_id).await?;
      debug!(
        subjob_id = %subjob.subjob_id,
        superjob_id = %subjob.superjob_id,
        "{}: trying to enqueue", subjob
      );
      if subjob.status != SubjobStatus::Initialized {
        return Ok(None);
      }

      // Resolve before touching state so a malformed tree leaves the node
      // initialized.
      let resolved = self.registry.resolve(&subjob)?;
      debug!(
        subjob_id = %subjob.subjob_id,
        superjob_id = %subjob.superjob_id,
        "{}: enqueueing", subjob
      );

      match resolved {
        Resolved::Parallel => self.enqueue_parallel(&subjob).await,
        Resolved::Batch => self.enqueue_batch(&subjob).await,
        Resolved::BatchChild => self.start_lane(&subjob).await,
        Resolved::Superworker(_) => self.enqueue_superworker(&subjob).await,
        Resolved::Executable(descriptor) => self.enqueue_executable(&subjob, descriptor).await,
      }
    }
    .boxed()
  }

  async fn enqueue_parallel(&self, subjob: &Subjob) -> Result<Option<String>, EngineError> {
    if !self.begin_running(subjob).await? {
      return Ok(None);
    }

    let children = self.store.children(&subjob.subjob_id).await?;
    if children.is_empty() {
      self.complete(&subjob.subjob_id).await?;
      return Ok(None);
    }

    debug!(
      subjob_id = %subjob.subjob_id,
      children = children.len(),
      "{}: enqueueing parallel children", subjob
    );
    let results = join_all(children.iter().map(|child| self.enqueue(&child.subjob_id))).await;
    first_handle(results)
  }

  async fn enqueue_batch(&self, subjob: &Subjob) -> Result<Option<String>, EngineError> {
    if !self.begin_running(subjob).await? {
      return Ok(None);
    }

    let lanes = self.store.children(&subjob.subjob_id).await?;
    if lanes.is_empty() {
      self.complete(&subjob.subjob_id).await?;
      return Ok(None);
    }

    debug!(
      subjob_id = %subjob.subjob_id,
      lanes = lanes.len(),
      "{}: enqueueing batch children", subjob
    );
    let results = join_all(lanes.iter().map(|lane| self.start_lane(lane))).await;
    first_handle(results)
  }

  /// Mark a batch lane running and start only its first element. The rest
  /// of the lane advances through `next_id`.
  fn start_lane<'a>(&'a self, lane: &'a Subjob) -> BoxFuture<'a, Result<Option<String>, EngineError>> {
    async move {
      if !self.begin_running(lane).await? {
        return Ok(None);
      }

      let elements = self.store.children(&lane.subjob_id).await?;
      match elements.first() {
        Some(first) => self.enqueue(&first.subjob_id).await,
        None => {
          self.complete(&lane.subjob_id).await?;
          Ok(None)
        }
      }
    }
    .boxed()
  }

  /// Entering a nested superjob is its completion trigger. It never reaches
  /// the backend and never becomes `queued`.
  async fn enqueue_superworker(&self, subjob: &Subjob) -> Result<Option<String>, EngineError> {
    if !self.begin_running(subjob).await? {
      return Ok(None);
    }
    self.complete(&subjob.subjob_id).await?;
    Ok(None)
  }

  async fn enqueue_executable(
    &self,
    subjob: &Subjob,
    descriptor: &WorkerDescriptor,
  ) -> Result<Option<String>, EngineError> {
    // The handle is stored with the queued status before the backend sees
    // the job, so a fast completion can always find its subjob.
    let handle = uuid::Uuid::new_v4().simple().to_string();
    if !self.store.queue(&subjob.subjob_id, &handle).await? {
      return Ok(None);
    }

    let invocation = Invocation {
      handle: handle.clone(),
      worker: descriptor.name.clone(),
      arguments: subjob.arguments.clone(),
      metadata: subjob.metadata.clone(),
      bypass_uniqueness: descriptor.is_unique(),
    };
    debug!(
      subjob_id = %subjob.subjob_id,
      job_handle = %handle,
      bypass_uniqueness = invocation.bypass_uniqueness,
      "{}: enqueueing in backend", subjob
    );

    let item = invocation.item();
    if let Err(source) = self.backend.invoke(invocation).await {
      let cause = source.to_string();
      if let Err(e) = self
        .fail(&subjob.subjob_id, &descriptor.name, item, &cause)
        .await
      {
        warn!(
          subjob_id = %subjob.subjob_id,
          error = %e,
          "failed to record backend rejection"
        );
      }
      return Err(EngineError::Backend {
        subjob_id: subjob.subjob_id.clone(),
        source,
      });
    }

    Ok(Some(handle))
  }

  async fn begin_running(&self, subjob: &Subjob) -> Result<bool, EngineError> {
    Ok(
      self
        .store
        .transition(
          &subjob.subjob_id,
          &[SubjobStatus::Initialized],
          SubjobStatus::Running,
        )
        .await?,
    )
  }
}

/// Collapse the results of a fan-out once every branch has settled.
///
/// Siblings are never cancelled part way, so a branch that already queued its
/// subjob always hands it to the backend. The first error wins; otherwise the
/// first branch's handle is returned.
fn first_handle(
  results: Vec<Result<Option<String>, EngineError>>,
) -> Result<Option<String>, EngineError> {
  let handles = results.into_iter().collect::<Result<Vec<_>, _>>()?;
  Ok(handles.into_iter().next().flatten())
}
