use std::fmt;

use serde::{Deserialize, Serialize};

/// What a subjob is, as persisted.
///
/// Serialized as a bare string: the three composite kinds use reserved
/// names, anything else is a worker identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubjobKind {
  /// Fans out every child at once.
  Parallel,
  /// Fans out the first element of every lane; lanes are `BatchChild`s.
  Batch,
  /// One lane of a batch. Its children form a chain.
  BatchChild,
  /// A worker identifier, resolved by the engine's registry.
  Worker(String),
}

impl SubjobKind {
  pub const PARALLEL: &'static str = "parallel";
  pub const BATCH: &'static str = "batch";
  pub const BATCH_CHILD: &'static str = "batch_child";

  pub fn worker(name: impl Into<String>) -> Self {
    SubjobKind::Worker(name.into())
  }

  pub fn as_str(&self) -> &str {
    match self {
      SubjobKind::Parallel => Self::PARALLEL,
      SubjobKind::Batch => Self::BATCH,
      SubjobKind::BatchChild => Self::BATCH_CHILD,
      SubjobKind::Worker(name) => name,
    }
  }

  pub fn is_reserved(name: &str) -> bool {
    matches!(name, Self::PARALLEL | Self::BATCH | Self::BATCH_CHILD)
  }

  /// Batch groups and lanes re-enter completion when their descendants finish.
  pub fn is_batch(&self) -> bool {
    matches!(self, SubjobKind::Batch | SubjobKind::BatchChild)
  }
}

impl From<String> for SubjobKind {
  fn from(value: String) -> Self {
    match value.as_str() {
      Self::PARALLEL => SubjobKind::Parallel,
      Self::BATCH => SubjobKind::Batch,
      Self::BATCH_CHILD => SubjobKind::BatchChild,
      _ => SubjobKind::Worker(value),
    }
  }
}

impl From<&str> for SubjobKind {
  fn from(value: &str) -> Self {
    SubjobKind::from(value.to_string())
  }
}

impl From<SubjobKind> for String {
  fn from(kind: SubjobKind) -> Self {
    match kind {
      SubjobKind::Worker(name) => name,
      other => other.as_str().to_string(),
    }
  }
}

impl fmt::Display for SubjobKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
