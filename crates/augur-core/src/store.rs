//! The `ForecastStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `augur-store-sqlite`).
//! The engine depends on this abstraction, never on a concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  forecast::{Forecast, ForecastFailure, NewForecast, NewForecastFailure},
  question::{QuestionContent, QuestionKey, QuestionState, QuestionUpsert, QuestionView, Snapshot},
  resolution::{Resolution, ResolutionEvent, ResolveOutcome, ResolvedQuestion},
  score::{ScoreChange, ScoreFilter, ScoreRecord},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`ForecastStore::list_forecasts`].
#[derive(Debug, Clone, Default)]
pub struct ForecastFilter {
  pub forecaster_id: Option<String>,
  pub question_id:   Option<Uuid>,
  pub since:         Option<DateTime<Utc>>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an Augur storage backend, the only component allowed to
/// mutate durable state.
///
/// Every write is idempotent under retry with the same logical key:
/// questions are keyed by identity, snapshots are deduplicated by content
/// hash, forecasts by `(question, forecaster, as_of)`, resolutions by
/// outcome, scores by `(question, forecaster)`. Re-running a cycle after a
/// crash never duplicates a durable effect.
///
/// All methods return `Send` futures so the store can be shared across tokio
/// worker tasks.
pub trait ForecastStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Questions & snapshots ─────────────────────────────────────────────

  /// Insert the question if its identity is new; return the stored row
  /// either way. New questions start `Open`.
  fn upsert_question(
    &self,
    key: QuestionKey,
  ) -> impl Future<Output = Result<QuestionUpsert, Self::Error>> + Send + '_;

  fn get_question(
    &self,
    question_id: Uuid,
  ) -> impl Future<Output = Result<Option<crate::question::Question>, Self::Error>> + Send + '_;

  /// Append a snapshot unless `content` hashes equal to the latest snapshot.
  /// Returns the new snapshot, or `None` when nothing changed. The
  /// compare-and-insert is atomic.
  fn append_snapshot_if_changed(
    &self,
    question_id: Uuid,
    content: QuestionContent,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  fn latest_snapshot(
    &self,
    question_id: Uuid,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  /// Full snapshot history, oldest first.
  fn snapshots(
    &self,
    question_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_;

  /// Questions with their latest snapshot, optionally filtered by state.
  /// Questions that have no snapshot yet are omitted.
  fn list_questions(
    &self,
    state: Option<QuestionState>,
  ) -> impl Future<Output = Result<Vec<QuestionView>, Self::Error>> + Send + '_;

  fn open_questions(
    &self,
  ) -> impl Future<Output = Result<Vec<QuestionView>, Self::Error>> + Send + '_ {
    self.list_questions(Some(QuestionState::Open))
  }

  // ── Forecasts ─────────────────────────────────────────────────────────

  /// Append a forecast. Appending the same `(question, forecaster, as_of)`
  /// twice returns the stored row without writing. Fails if the question is
  /// no longer `Open` or the probability is out of range.
  fn append_forecast(
    &self,
    input: NewForecast,
  ) -> impl Future<Output = Result<Forecast, Self::Error>> + Send + '_;

  /// All forecasts for a question, oldest first.
  fn forecasts_for(
    &self,
    question_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Forecast>, Self::Error>> + Send + '_;

  fn list_forecasts<'a>(
    &'a self,
    filter: &'a ForecastFilter,
  ) -> impl Future<Output = Result<Vec<Forecast>, Self::Error>> + Send + 'a;

  fn record_forecast_failure(
    &self,
    input: NewForecastFailure,
  ) -> impl Future<Output = Result<ForecastFailure, Self::Error>> + Send + '_;

  fn forecast_failures(
    &self,
    question_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<ForecastFailure>, Self::Error>> + Send + '_;

  // ── Resolutions ───────────────────────────────────────────────────────

  /// Apply a resolution event atomically: the resolution row and the state
  /// transition commit together or not at all.
  fn resolve_question(
    &self,
    question_id: Uuid,
    event: ResolutionEvent,
  ) -> impl Future<Output = Result<ResolveOutcome, Self::Error>> + Send + '_;

  /// Resolution history for a question, oldest recorded first.
  fn resolutions_for(
    &self,
    question_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Resolution>, Self::Error>> + Send + '_;

  /// Every question with at least one resolution row.
  fn resolved_questions(
    &self,
  ) -> impl Future<Output = Result<Vec<ResolvedQuestion>, Self::Error>> + Send + '_;

  // ── Scores ────────────────────────────────────────────────────────────

  /// Insert or overwrite the record for `(question_id, forecaster_id)`.
  fn upsert_score(
    &self,
    record: ScoreRecord,
  ) -> impl Future<Output = Result<ScoreChange, Self::Error>> + Send + '_;

  /// Delete the question's score records for forecasters not in `keep`.
  /// Returns the number of records removed.
  fn prune_scores(
    &self,
    question_id: Uuid,
    keep: Vec<String>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn score_records<'a>(
    &'a self,
    filter: &'a ScoreFilter,
  ) -> impl Future<Output = Result<Vec<ScoreRecord>, Self::Error>> + Send + 'a;
}
