//! In-process execution backend.
//!
//! `LocalBackend` runs registered [`Worker`]s on tokio tasks and reports the
//! outcome of every invocation on a channel. A [`crate::BackendRunner`] feeds
//! those reports back into the engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::backend::{BackendError, ExecutionBackend, Invocation};
use crate::registry::{UniquePolicy, WorkerDescriptor};

/// A unit of leaf work runnable by [`LocalBackend`].
#[async_trait]
pub trait Worker: Send + Sync {
  async fn perform(&self, arguments: serde_json::Value) -> Result<(), String>;
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReport {
  Succeeded {
    handle: String,
  },
  Failed {
    handle: String,
    worker: String,
    item: serde_json::Value,
    cause: String,
  },
}

impl BackendReport {
  pub fn handle(&self) -> &str {
    match self {
      BackendReport::Succeeded { handle } => handle,
      BackendReport::Failed { handle, .. } => handle,
    }
  }
}

struct RegisteredWorker {
  worker: Arc<dyn Worker>,
  unique: Option<UniquePolicy>,
}

/// A uniqueness lock on one worker and argument list.
struct UniqueLock {
  handle: String,
  expires_at: Option<Instant>,
}

impl UniqueLock {
  fn is_held(&self, now: Instant) -> bool {
    self.expires_at.is_none_or(|expires_at| now < expires_at)
  }
}

type InFlight = Arc<Mutex<HashMap<(String, String), UniqueLock>>>;

/// Runs workers in this process.
///
/// Workers registered with a [`UniquePolicy`] behave like a deduplicating
/// queue: while an invocation with the same worker and arguments holds the
/// lock, another one is silently dropped unless it asks to bypass
/// uniqueness. The lock is released when the invocation finishes, or once
/// the policy's expiration has passed.
pub struct LocalBackend {
  workers: HashMap<String, RegisteredWorker>,
  in_flight: InFlight,
  reports: mpsc::UnboundedSender<BackendReport>,
}

impl LocalBackend {
  /// Create a backend and the receiving end of its report channel.
  pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendReport>) {
    let (reports, receiver) = mpsc::unbounded_channel();
    let backend = Self {
      workers: HashMap::new(),
      in_flight: Arc::new(Mutex::new(HashMap::new())),
      reports,
    };
    (backend, receiver)
  }

  /// Run `worker` for the descriptor's name, with the descriptor's
  /// uniqueness policy.
  pub fn register(&mut self, descriptor: &WorkerDescriptor, worker: Arc<dyn Worker>) {
    self.workers.insert(
      descriptor.name.clone(),
      RegisteredWorker {
        worker,
        unique: descriptor.unique.clone(),
      },
    );
  }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
  async fn invoke(&self, invocation: Invocation) -> Result<(), BackendError> {
    let registered = self
      .workers
      .get(&invocation.worker)
      .ok_or_else(|| BackendError::UnknownWorker(invocation.worker.clone()))?;
    if self.reports.is_closed() {
      return Err(BackendError::Closed);
    }

    let key = (invocation.worker.clone(), invocation.arguments.to_string());
    let policy = match &registered.unique {
      Some(policy) if !invocation.bypass_uniqueness => Some(policy),
      _ => None,
    };
    if let Some(policy) = policy {
      let mut in_flight = self
        .in_flight
        .lock()
        .map_err(|_| BackendError::Other("in-flight set poisoned".to_string()))?;
      let now = Instant::now();
      if in_flight.get(&key).is_some_and(|lock| lock.is_held(now)) {
        debug!(
          worker = %invocation.worker,
          job_handle = %invocation.handle,
          "duplicate invocation dropped"
        );
        return Ok(());
      }
      let expires_at = policy
        .expiration_secs
        .map(|secs| now + Duration::from_secs(secs));
      in_flight.insert(
        key.clone(),
        UniqueLock {
          handle: invocation.handle.clone(),
          expires_at,
        },
      );
    }
    let tracked = policy.is_some();

    let worker = registered.worker.clone();
    let in_flight = self.in_flight.clone();
    let reports = self.reports.clone();
    let item = invocation.item();

    tokio::spawn(async move {
      let result = worker.perform(invocation.arguments).await;

      // Only release the lock this invocation took. An expired lock may
      // already belong to a later one.
      if tracked {
        if let Ok(mut in_flight) = in_flight.lock() {
          if in_flight
            .get(&key)
            .is_some_and(|lock| lock.handle == invocation.handle)
          {
            in_flight.remove(&key);
          }
        }
      }

      let report = match result {
        Ok(()) => BackendReport::Succeeded {
          handle: invocation.handle,
        },
        Err(cause) => BackendReport::Failed {
          handle: invocation.handle,
          worker: invocation.worker,
          item,
          cause,
        },
      };
      // Ignore send errors - receiver may have been dropped
      let _ = reports.send(report);
    });

    Ok(())
  }
}
