use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
  #[error("unknown subjob status: {0}")]
  UnknownStatus(String),

  #[error("unknown superjob status: {0}")]
  UnknownSuperjobStatus(String),

  #[error("empty {0} in superjob blueprint")]
  EmptyGroup(&'static str),

  #[error("invalid worker identifier: {0:?}")]
  InvalidWorker(String),
}
