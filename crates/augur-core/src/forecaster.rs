//! The `Forecaster` contract consumed by the forecast scheduler.
//!
//! Implementations live in `augur-forecasters`. The scheduler owns timeouts,
//! retries, rate limiting and validation; a forecaster only turns one request
//! into one probability or one classified error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::{forecast::ForecastErrorKind, question::QuestionView};

/// Everything a forecaster may see about a question.
#[derive(Debug, Clone)]
pub struct ForecastRequest {
  pub question_id:     Uuid,
  pub question_text:   String,
  pub background:      Option<String>,
  pub resolution_date: Option<NaiveDate>,
  pub today:           NaiveDate,
  /// The venue's crowd probability from the latest snapshot.
  pub base_rate:       Option<f64>,
  /// Provider-specific model identifier.
  pub model:           String,
  pub timeout:         Duration,
}

impl ForecastRequest {
  pub fn from_view(
    view: &QuestionView,
    model: impl Into<String>,
    today: NaiveDate,
    timeout: Duration,
  ) -> Self {
    let content = &view.latest.content;
    Self {
      question_id: view.question.question_id,
      question_text: content.text.clone(),
      background: content.background.clone(),
      resolution_date: content.resolution_date,
      today,
      base_rate: content.base_rate,
      model: model.into(),
      timeout,
    }
  }
}

/// A successful, not-yet-validated forecaster response.
#[derive(Debug, Clone)]
pub struct Generation {
  pub probability: f64,
  pub raw_output:  String,
  pub reasoning:   Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ForecastError {
  #[error("rate limited")]
  RateLimited { retry_after: Option<Duration> },

  #[error("request timed out")]
  Timeout,

  #[error("invalid output: {0}")]
  InvalidOutput(String),

  #[error("provider unavailable: {0}")]
  ProviderUnavailable(String),
}

impl ForecastError {
  pub fn kind(&self) -> ForecastErrorKind {
    match self {
      Self::RateLimited { .. } => ForecastErrorKind::RateLimited,
      Self::Timeout => ForecastErrorKind::Timeout,
      Self::InvalidOutput(_) => ForecastErrorKind::InvalidOutput,
      Self::ProviderUnavailable(_) => ForecastErrorKind::ProviderUnavailable,
    }
  }

  /// Transient failures worth another attempt after a backoff.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, Self::InvalidOutput(_))
  }

  /// Failures that indicate the provider itself is unhealthy and count
  /// towards its circuit breaker. Rate limiting is backpressure, not an
  /// outage.
  pub fn counts_against_provider(&self) -> bool {
    matches!(self, Self::Timeout | Self::ProviderUnavailable(_))
  }
}

/// An automated forecaster backed by some inference provider.
#[async_trait]
pub trait Forecaster: Send + Sync {
  /// Stable identifier recorded on every forecast (e.g. `"gpt-4o-mini"`).
  fn id(&self) -> &str;

  /// Provider name; forecasters sharing a provider share its worker pool,
  /// rate limit and circuit breaker.
  fn provider(&self) -> &str;

  /// Model identifier passed through in [`ForecastRequest::model`].
  fn model(&self) -> &str;

  async fn generate(
    &self,
    request: &ForecastRequest,
  ) -> Result<Generation, ForecastError>;
}
