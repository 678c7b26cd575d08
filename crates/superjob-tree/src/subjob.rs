use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kind::SubjobKind;
use crate::status::SubjobStatus;

/// One node of a superjob's tree, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subjob {
  pub subjob_id: String,
  pub superjob_id: String,
  /// Lookup link to the owning subjob. `None` for top-level subjobs.
  pub parent_id: Option<String>,
  /// Next subjob of a sequential chain.
  pub next_id: Option<String>,
  /// Ordering among the parent's children (or among top-level subjobs).
  pub position: u32,
  pub kind: SubjobKind,
  pub status: SubjobStatus,
  /// True once every subjob in this subtree has finished.
  pub descendants_are_complete: bool,
  /// Execution backend handle, assigned by the dispatcher before invocation.
  pub job_handle: Option<String>,
  pub arguments: serde_json::Value,
  pub metadata: serde_json::Value,
}

impl Subjob {
  /// A fresh, `initialized` subjob with no links or payload.
  pub fn new(
    subjob_id: impl Into<String>,
    superjob_id: impl Into<String>,
    kind: SubjobKind,
  ) -> Self {
    Self {
      subjob_id: subjob_id.into(),
      superjob_id: superjob_id.into(),
      parent_id: None,
      next_id: None,
      position: 0,
      kind,
      status: SubjobStatus::Initialized,
      descendants_are_complete: false,
      job_handle: None,
      arguments: serde_json::Value::Null,
      metadata: serde_json::Value::Null,
    }
  }
}

impl fmt::Display for Subjob {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Subjob #{} ({})", self.subjob_id, self.kind)
  }
}
