//! Error types for `augur-core`.

use thiserror::Error;

use crate::question::QuestionState;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid question: {0}")]
  InvalidQuestion(String),

  #[error("probability {0} is outside [0, 1]")]
  ProbabilityOutOfRange(f64),

  #[error("outcome {0} is outside [0, 1]")]
  OutcomeOutOfRange(f64),

  #[error("illegal state transition: {from} -> {to}")]
  IllegalTransition {
    from: QuestionState,
    to:   QuestionState,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
