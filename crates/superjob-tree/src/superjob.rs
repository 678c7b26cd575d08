use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Status of a superjob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuperjobStatus {
  Running,
  Complete,
  Failed,
}

impl SuperjobStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      SuperjobStatus::Running => "running",
      SuperjobStatus::Complete => "complete",
      SuperjobStatus::Failed => "failed",
    }
  }
}

impl fmt::Display for SuperjobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SuperjobStatus {
  type Err = TreeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "running" => Ok(SuperjobStatus::Running),
      "complete" => Ok(SuperjobStatus::Complete),
      "failed" => Ok(SuperjobStatus::Failed),
      other => Err(TreeError::UnknownSuperjobStatus(other.to_string())),
    }
  }
}

/// A top-level orchestrated execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Superjob {
  pub superjob_id: String,
  pub name: String,
  pub status: SuperjobStatus,
  pub created_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
}

impl Superjob {
  pub fn new(superjob_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      superjob_id: superjob_id.into(),
      name: name.into(),
      status: SuperjobStatus::Running,
      created_at: Utc::now(),
      completed_at: None,
      error: None,
    }
  }
}
