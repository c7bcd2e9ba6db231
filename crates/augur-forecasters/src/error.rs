//! Error types for `augur-forecasters`. Construction-time only; failures of
//! an individual request are [`augur_core::forecaster::ForecastError`]s.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown forecaster kind: {0:?}")]
  UnknownKind(String),

  #[error("environment variable {0} is not set")]
  MissingApiKey(String),

  #[error("failed to build HTTP client: {0}")]
  Client(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
