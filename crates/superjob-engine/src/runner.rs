//! Backend report runner.
//!
//! The `BackendRunner` owns the receiving end of a backend's report channel
//! and turns every report into an engine callback.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::Engine;
use crate::local::BackendReport;

/// Delivers backend reports to an [`Engine`].
///
/// # Usage
///
/// ```ignore
/// let (backend, reports) = LocalBackend::new();
/// let engine = Arc::new(Engine::new(store, Arc::new(backend), registry, handler, config));
///
/// let cancel = CancellationToken::new();
/// tokio::spawn(BackendRunner::new(engine.clone(), reports).start(cancel.clone()));
///
/// engine.start("sj").await?;
/// ```
pub struct BackendRunner {
  engine: Arc<Engine>,
  receiver: mpsc::UnboundedReceiver<BackendReport>,
}

impl BackendRunner {
  pub fn new(engine: Arc<Engine>, receiver: mpsc::UnboundedReceiver<BackendReport>) -> Self {
    Self { engine, receiver }
  }

  /// Run until the token is cancelled or the channel closes.
  ///
  /// Each report is handled on its own task, so sibling completions reach
  /// the engine concurrently.
  pub async fn start(mut self, cancel: CancellationToken) {
    info!("starting backend runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("backend runner cancelled");
          break;
        }
        report = self.receiver.recv() => {
          match report {
            Some(report) => {
              let engine = self.engine.clone();
              tokio::spawn(async move { deliver(&engine, report).await });
            }
            None => {
              info!("backend report channel closed");
              break;
            }
          }
        }
      }
    }
  }
}

async fn deliver(engine: &Engine, report: BackendReport) {
  let result = match &report {
    BackendReport::Succeeded { handle } => engine.complete_by_handle(handle).await,
    BackendReport::Failed {
      handle,
      worker,
      item,
      cause,
    } => {
      engine
        .fail_by_handle(handle, worker, item.clone(), cause)
        .await
    }
  };

  if let Err(e) = result {
    error!(
      job_handle = %report.handle(),
      error = %e,
      "failed to deliver backend report"
    );
  }
}
