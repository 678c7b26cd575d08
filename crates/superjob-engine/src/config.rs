use serde::{Deserialize, Serialize};

/// Configuration for the orchestration engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Retire a superjob's subjobs once it completes.
  ///
  /// When set, the engine skips the bookkeeping-only `complete` status on
  /// parallel groups, since the records may already be gone.
  pub delete_subjobs_after_superjob_completes: bool,
}
