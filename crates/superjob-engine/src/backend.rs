//! Execution backend interface.
//!
//! The backend runs leaf work. It accepts a caller-supplied handle so the
//! engine can persist the handle before the job can possibly finish, and it
//! reports back through [`crate::Engine::complete_by_handle`] and
//! [`crate::Engine::fail_by_handle`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors an execution backend can return from [`ExecutionBackend::invoke`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  #[error("worker '{0}' is not available on this backend")]
  UnknownWorker(String),

  #[error("backend is shut down")]
  Closed,

  #[error("{0}")]
  Other(String),
}

/// One request to run a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
  /// Handle pre-assigned by the engine and already persisted on the subjob.
  pub handle: String,
  pub worker: String,
  pub arguments: serde_json::Value,
  /// Backend-specific options, passed through untouched.
  pub metadata: serde_json::Value,
  /// Run even if the worker's deduplication policy would drop this call.
  pub bypass_uniqueness: bool,
}

impl Invocation {
  /// The job item as the backend sees it.
  ///
  /// `class`, `args` and `jid` come from the invocation; the object fields of
  /// `metadata` are merged in without overriding those three.
  pub fn item(&self) -> serde_json::Value {
    let mut item = serde_json::Map::new();
    item.insert("class".to_string(), self.worker.clone().into());
    item.insert("args".to_string(), self.arguments.clone());
    item.insert("jid".to_string(), self.handle.clone().into());

    if let serde_json::Value::Object(metadata) = &self.metadata {
      for (key, value) in metadata {
        item.entry(key.clone()).or_insert_with(|| value.clone());
      }
    }

    serde_json::Value::Object(item)
  }
}

/// Something that can run leaf subjobs.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
  /// Hand one invocation to the backend. Must not wait for the job to finish.
  async fn invoke(&self, invocation: Invocation) -> Result<(), BackendError>;
}
