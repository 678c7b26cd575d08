//! Completion cascade.
//!
//! A subjob's own completion starts its subtree. Once the subtree is done,
//! `descendants_are_complete` is set and propagation moves up to the parent
//! (when every sibling is done) and sideways along the `next_id` chain.
//!
//! Concurrent completions of siblings may both observe "every sibling is
//! done". Only the caller whose `mark_descendants_complete` write wins goes
//! on to propagate, so each parent is handled exactly once.

use futures::FutureExt;
use futures::future::BoxFuture;
use superjob_tree::{SubjobKind, SubjobStatus};
use tracing::debug;

use crate::engine::Engine;
use crate::error::EngineError;

impl Engine {
  /// Mark a subjob complete and start whatever it unblocks.
  pub fn complete<'a>(&'a self, subjob_id: &'a str) -> BoxFuture<'a, Result<(), EngineError>> {
    async move {
      let completed = self
        .store
        .transition(
          subjob_id,
          &[
            SubjobStatus::Queued,
            SubjobStatus::Running,
            SubjobStatus::Complete,
          ],
          SubjobStatus::Complete,
        )
        .await?;
      if !completed {
        let subjob = self.store.get_subjob(subjob_id).await?;
        return Err(EngineError::UnexpectedStatus {
          subjob_id: subjob.subjob_id,
          operation: "complete",
          status: subjob.status,
        });
      }

      let subjob = self.store.get_subjob(subjob_id).await?;
      debug!(
        subjob_id = %subjob.subjob_id,
        superjob_id = %subjob.superjob_id,
        "{}: complete", subjob
      );

      let children = self.store.children(subjob_id).await?;
      match children.first() {
        Some(first) => {
          debug!(subjob_id = %subjob.subjob_id, "{}: enqueueing children", subjob);
          self.enqueue(&first.subjob_id).await?;
          Ok(())
        }
        None => self.descendants_complete(subjob_id).await,
      }
    }
    .boxed()
  }

  /// Everything below `subjob_id` has finished.
  pub(crate) fn descendants_complete<'a>(
    &'a self,
    subjob_id: &'a str,
  ) -> BoxFuture<'a, Result<(), EngineError>> {
    async move {
      if !self.store.mark_descendants_complete(subjob_id).await? {
        return Ok(());
      }

      let subjob = self.store.get_subjob(subjob_id).await?;
      debug!(
        subjob_id = %subjob.subjob_id,
        superjob_id = %subjob.superjob_id,
        "{}: descendants are complete", subjob
      );

      // Batch groups and lanes re-enter completion once their chains finish.
      if subjob.kind.is_batch() {
        self.complete(subjob_id).await?;
      }

      let parent = match &subjob.parent_id {
        Some(parent_id) => Some(self.store.get_subjob(parent_id).await?),
        None => None,
      };
      let is_child_of_parallel = parent
        .as_ref()
        .is_some_and(|parent| parent.kind == SubjobKind::Parallel);

      if let Some(parent) = &parent {
        let siblings = self.store.children(&parent.subjob_id).await?;
        if siblings.iter().all(|sibling| sibling.descendants_are_complete) {
          debug!(
            subjob_id = %subjob.subjob_id,
            parent_id = %parent.subjob_id,
            "{}: parent ({}) is complete", subjob, parent
          );
          self.descendants_complete(&parent.subjob_id).await?;

          // Bookkeeping only. With retention off the records may be gone.
          if is_child_of_parallel && !self.config.delete_subjobs_after_superjob_completes {
            self
              .store
              .transition(
                &parent.subjob_id,
                &[SubjobStatus::Running, SubjobStatus::Complete],
                SubjobStatus::Complete,
              )
              .await?;
          }
        }
      }

      if is_child_of_parallel {
        return Ok(());
      }

      if let Some(next_id) = &subjob.next_id {
        self.enqueue(next_id).await?;
        return Ok(());
      }

      if parent.is_none() {
        debug!(
          subjob_id = %subjob.subjob_id,
          superjob_id = %subjob.superjob_id,
          "{}: superjob is complete", subjob
        );
        self
          .handler
          .on_workflow_complete(&subjob.superjob_id)
          .await?;
      }

      Ok(())
    }
    .boxed()
  }
}
