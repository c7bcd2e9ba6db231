//! Forecasts and failed forecast attempts.
//!
//! A forecast is an immutable probability for one question from one
//! forecaster at one point in time. A newer forecast for the same pair
//! supersedes an older one simply by having a later `as_of`; nothing is ever
//! updated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Forecast ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
  pub forecast_id:   Uuid,
  pub question_id:   Uuid,
  pub forecaster_id: String,
  /// When the forecast was produced. Scoring never uses a forecast whose
  /// `as_of` is later than the resolution event.
  pub as_of:         DateTime<Utc>,
  pub probability:   f64,
  /// The unparsed provider response, kept for audit.
  pub raw_output:    String,
  pub reasoning:     Option<String>,
  pub latency_ms:    u64,
  /// Number of failed attempts before this one succeeded.
  pub retry_count:   u32,
  /// Whether the probability was clamped into [0, 1].
  pub clamped:       bool,
}

/// Input to [`crate::store::ForecastStore::append_forecast`].
#[derive(Debug, Clone)]
pub struct NewForecast {
  pub question_id:   Uuid,
  pub forecaster_id: String,
  pub as_of:         DateTime<Utc>,
  pub probability:   f64,
  pub raw_output:    String,
  pub reasoning:     Option<String>,
  pub latency_ms:    u64,
  pub retry_count:   u32,
  pub clamped:       bool,
}

impl NewForecast {
  pub fn validate(&self) -> Result<()> {
    check_probability(self.probability)
  }
}

/// Reject NaN, infinities and anything outside [0, 1].
pub fn check_probability(p: f64) -> Result<()> {
  if p.is_finite() && (0.0..=1.0).contains(&p) {
    Ok(())
  } else {
    Err(Error::ProbabilityOutOfRange(p))
  }
}

// ─── Failures ────────────────────────────────────────────────────────────────

/// Category of a failed forecast attempt; mirrors
/// [`crate::forecaster::ForecastError`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastErrorKind {
  RateLimited,
  Timeout,
  InvalidOutput,
  ProviderUnavailable,
}

/// A forecast request that exhausted its attempts. Never produces a
/// [`Forecast`] row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastFailure {
  pub failure_id:    Uuid,
  pub question_id:   Uuid,
  pub forecaster_id: String,
  pub kind:          ForecastErrorKind,
  pub message:       String,
  pub attempts:      u32,
  /// Server-assigned.
  pub failed_at:     DateTime<Utc>,
}

/// Input to [`crate::store::ForecastStore::record_forecast_failure`].
#[derive(Debug, Clone)]
pub struct NewForecastFailure {
  pub question_id:   Uuid,
  pub forecaster_id: String,
  pub kind:          ForecastErrorKind,
  pub message:       String,
  pub attempts:      u32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn probability_bounds() {
    assert!(check_probability(0.0).is_ok());
    assert!(check_probability(1.0).is_ok());
    assert!(check_probability(0.65).is_ok());
    assert!(check_probability(1.5).is_err());
    assert!(check_probability(-0.1).is_err());
    assert!(check_probability(f64::NAN).is_err());
    assert!(check_probability(f64::INFINITY).is_err());
  }
}
