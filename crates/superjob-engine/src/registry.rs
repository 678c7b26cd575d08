//! Worker registry.
//!
//! Maps worker identifiers to descriptors, populated at process start. The
//! dispatcher resolves every subjob through it: composite kinds map to their
//! fan-out plans, worker identifiers to either a backend-executable worker or
//! a nested superjob.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use superjob_tree::{Subjob, SubjobKind};

use crate::error::EngineError;

/// How a registered worker is run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerCapability {
  /// Handed to the execution backend.
  #[default]
  Executable,
  /// A nested superjob. Entering it is its completion trigger.
  Superworker,
}

/// A backend deduplication policy configured for a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniquePolicy {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expiration_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
  pub name: String,
  #[serde(default)]
  pub capability: WorkerCapability,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub unique: Option<UniquePolicy>,
}

impl WorkerDescriptor {
  pub fn executable(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      capability: WorkerCapability::Executable,
      unique: None,
    }
  }

  pub fn superworker(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      capability: WorkerCapability::Superworker,
      unique: None,
    }
  }

  pub fn with_unique(mut self, policy: UniquePolicy) -> Self {
    self.unique = Some(policy);
    self
  }

  pub fn is_unique(&self) -> bool {
    self.unique.is_some()
  }
}

/// What the dispatcher should do with a subjob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
  Parallel,
  Batch,
  BatchChild,
  Superworker(&'a WorkerDescriptor),
  Executable(&'a WorkerDescriptor),
}

#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
  workers: HashMap<String, WorkerDescriptor>,
}

impl WorkerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a worker, returning the descriptor it replaced.
  pub fn register(&mut self, descriptor: WorkerDescriptor) -> Option<WorkerDescriptor> {
    self.workers.insert(descriptor.name.clone(), descriptor)
  }

  pub fn get(&self, name: &str) -> Option<&WorkerDescriptor> {
    self.workers.get(name)
  }

  /// Resolve a subjob's kind to a dispatch plan.
  pub fn resolve(&self, subjob: &Subjob) -> Result<Resolved<'_>, EngineError> {
    match &subjob.kind {
      SubjobKind::Parallel => Ok(Resolved::Parallel),
      SubjobKind::Batch => Ok(Resolved::Batch),
      SubjobKind::BatchChild => Ok(Resolved::BatchChild),
      SubjobKind::Worker(name) => {
        let descriptor = self
          .workers
          .get(name)
          .ok_or_else(|| EngineError::UnknownWorker {
            subjob_id: subjob.subjob_id.clone(),
            worker: name.clone(),
          })?;
        Ok(match descriptor.capability {
          WorkerCapability::Executable => Resolved::Executable(descriptor),
          WorkerCapability::Superworker => Resolved::Superworker(descriptor),
        })
      }
    }
  }
}

impl FromIterator<WorkerDescriptor> for WorkerRegistry {
  fn from_iter<I: IntoIterator<Item = WorkerDescriptor>>(iter: I) -> Self {
    let mut registry = WorkerRegistry::new();
    for descriptor in iter {
      registry.register(descriptor);
    }
    registry
  }
}
