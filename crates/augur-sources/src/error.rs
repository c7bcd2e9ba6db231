//! Error types for `augur-sources`. These only arise while building
//! adapters; failures while talking to a venue are
//! [`augur_core::source::SourceError`]s.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown source kind: {0:?}")]
  UnknownKind(String),

  #[error("environment variable {0} is not set")]
  MissingApiKey(String),

  #[error("failed to build HTTP client: {0}")]
  Client(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
