//! Score records: the derived, recomputable accuracy of one forecaster on one
//! question.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Squared error between a probability and a (possibly graded) outcome.
pub fn brier(probability: f64, outcome: f64) -> f64 {
  (probability - outcome).powi(2)
}

/// The score of one forecaster on one resolved question.
///
/// Holds no wall-clock fields: recomputing from the same forecasts and
/// resolutions yields an identical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
  pub question_id:    Uuid,
  pub forecaster_id:  String,
  pub forecast_id:    Uuid,
  pub forecast_as_of: DateTime<Utc>,
  pub probability:    f64,
  /// The active resolution at scoring time.
  pub resolution_id:  Uuid,
  pub outcome:        f64,
  /// The resolution event time; `forecast_as_of <= cutoff` always holds.
  pub cutoff:         DateTime<Utc>,
  pub brier:          f64,
  /// Category from the question's latest snapshot, for grouped views.
  pub category:       Option<String>,
}

/// What [`crate::store::ForecastStore::upsert_score`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreChange {
  Inserted,
  Updated,
  Unchanged,
}

/// Parameters for [`crate::store::ForecastStore::score_records`].
#[derive(Debug, Clone, Default)]
pub struct ScoreFilter {
  pub forecaster_id: Option<String>,
  pub category:      Option<String>,
  pub question_id:   Option<Uuid>,
  /// Only records whose resolution cutoff is at or after this instant.
  pub cutoff_after:  Option<DateTime<Utc>>,
  pub cutoff_before: Option<DateTime<Utc>>,
}
