//! Error types for `augur-engine`.

use thiserror::Error;

/// Why a venue record was not ingested.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
  #[error("empty source question id")]
  EmptyId,

  #[error("empty question text")]
  EmptyText,

  #[error("base rate {0} outside [0, 1]")]
  BaseRateOutOfRange(f64),

  #[error("outcome {0} outside [0, 1]")]
  OutcomeOutOfRange(f64),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("duplicate source name: {0:?}")]
  DuplicateSource(String),

  #[error("unknown source name: {0:?}")]
  UnknownSource(String),

  #[error("duplicate forecaster id: {0:?}")]
  DuplicateForecaster(String),

  #[error("invalid configuration for {field}: {reason}")]
  InvalidConfig { field: &'static str, reason: String },

  #[error("storage error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("validation error: {0}")]
  Validation(#[from] ValidationError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  /// Box a backend error so it can cross the crate boundary.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
