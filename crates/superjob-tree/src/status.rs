use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Lifecycle status of a subjob.
///
/// `Queued` is reserved for leaf subjobs handed to the execution backend.
/// `Running` marks composite subjobs whose own work is fanning out children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjobStatus {
  Initialized,
  Queued,
  Running,
  Complete,
  Failed,
}

impl SubjobStatus {
  pub const ALL: [SubjobStatus; 5] = [
    SubjobStatus::Initialized,
    SubjobStatus::Queued,
    SubjobStatus::Running,
    SubjobStatus::Complete,
    SubjobStatus::Failed,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      SubjobStatus::Initialized => "initialized",
      SubjobStatus::Queued => "queued",
      SubjobStatus::Running => "running",
      SubjobStatus::Complete => "complete",
      SubjobStatus::Failed => "failed",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, SubjobStatus::Complete | SubjobStatus::Failed)
  }

  /// Whether moving from `self` to `next` respects the monotonic lifecycle.
  ///
  /// `complete -> complete` is allowed: batch groups and lanes re-enter
  /// their own completion once their descendants finish.
  pub fn can_transition_to(&self, next: SubjobStatus) -> bool {
    use SubjobStatus::*;

    matches!(
      (self, next),
      (Initialized, Queued)
        | (Initialized, Running)
        | (Queued, Complete)
        | (Queued, Failed)
        | (Running, Complete)
        | (Running, Failed)
        | (Complete, Complete)
    )
  }
}

impl fmt::Display for SubjobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SubjobStatus {
  type Err = TreeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    SubjobStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| TreeError::UnknownStatus(s.to_string()))
  }
}
