//! The `SourceAdapter` contract: one implementation per prediction venue.
//!
//! Adapters only translate venue data into [`RawQuestion`]s and
//! [`ResolutionStatus`]es. Normalisation, deduplication and persistence are
//! the ingestion coordinator's job.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A venue question as the adapter found it, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawQuestion {
  pub source_question_id: String,
  pub text:               String,
  pub background:         Option<String>,
  pub category:           Option<String>,
  pub url:                Option<String>,
  pub open_date:          Option<DateTime<Utc>>,
  pub resolution_date:    Option<NaiveDate>,
  pub base_rate:          Option<f64>,
}

/// The venue's current view of whether a question has resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionStatus {
  Resolved {
    outcome:     f64,
    /// Venue-reported resolution time, if the venue publishes one.
    resolved_at: Option<DateTime<Utc>>,
    confirmed:   bool,
  },
  StillOpen,
  /// Withdrawn, voided or annulled by the venue.
  Cancelled { reason: Option<String> },
  /// The venue no longer knows the question.
  NotFound,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceErrorKind {
  /// Worth retrying next cycle: network faults, throttling, 5xx.
  Transient,
  /// The venue answered but the answer is unusable.
  Permanent,
}

#[derive(Debug, Clone, Error)]
#[error("{kind} source error: {message}")]
pub struct SourceError {
  pub kind:    SourceErrorKind,
  pub message: String,
}

impl SourceError {
  pub fn transient(message: impl Into<String>) -> Self {
    Self { kind: SourceErrorKind::Transient, message: message.into() }
  }

  pub fn permanent(message: impl Into<String>) -> Self {
    Self { kind: SourceErrorKind::Permanent, message: message.into() }
  }

  pub fn is_transient(&self) -> bool { self.kind == SourceErrorKind::Transient }
}

/// A prediction venue.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
  /// Registry name; also the `source` half of every question identity.
  fn name(&self) -> &str;

  async fn fetch_questions(&self) -> Result<Vec<RawQuestion>, SourceError>;

  async fn fetch_resolution(
    &self,
    source_question_id: &str,
  ) -> Result<ResolutionStatus, SourceError>;
}
