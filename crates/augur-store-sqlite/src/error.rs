//! Error type for `augur-store-sqlite`.

use augur_core::question::QuestionState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] augur_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {column} value: {value:?}")]
  UnknownValue {
    column: &'static str,
    value:  String,
  },

  #[error("question not found: {0}")]
  QuestionNotFound(uuid::Uuid),

  /// Forecasts are frozen once a question leaves `Open`.
  #[error("question {question_id} is {state}, not open")]
  QuestionNotOpen {
    question_id: uuid::Uuid,
    state:       QuestionState,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
