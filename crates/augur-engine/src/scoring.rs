//! The scoring engine: Brier scores with no lookahead.
//!
//! For each resolved question the outcome comes from the active resolution,
//! but the lookahead cutoff is the *earliest* resolution event across all of
//! the question's resolution rows. A venue correction can change the outcome
//! being scored against; it can never widen the window of eligible forecasts.

use std::collections::BTreeMap;

use augur_core::{
  forecast::Forecast,
  resolution::ResolvedQuestion,
  score::{ScoreChange, ScoreRecord, brier},
  store::ForecastStore,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringReport {
  pub questions: usize,
  pub inserted:  usize,
  pub updated:   usize,
  pub unchanged: usize,
  /// Stale records removed because their forecaster has no eligible
  /// forecast any more.
  pub pruned:    usize,
  /// Resolved questions with no forecast made before the cutoff.
  pub no_eligible_forecast: usize,
}

/// Score every forecaster on one resolved question. Pure: the result depends
/// only on the inputs, and is ordered by forecaster id.
pub fn score_question(rq: &ResolvedQuestion, forecasts: &[Forecast]) -> Vec<ScoreRecord> {
  let (Some(active), Some(cutoff)) = (rq.active(), rq.cutoff()) else {
    return Vec::new();
  };

  let mut latest: BTreeMap<&str, &Forecast> = BTreeMap::new();
  for f in forecasts.iter().filter(|f| f.as_of <= cutoff) {
    latest
      .entry(f.forecaster_id.as_str())
      .and_modify(|cur| {
        if f.as_of > cur.as_of {
          *cur = f;
        }
      })
      .or_insert(f);
  }

  latest
    .into_values()
    .map(|f| ScoreRecord {
      question_id: rq.view.question.question_id,
      forecaster_id: f.forecaster_id.clone(),
      forecast_id: f.forecast_id,
      forecast_as_of: f.as_of,
      probability: f.probability,
      resolution_id: active.resolution_id,
      outcome: active.outcome,
      cutoff,
      brier: brier(f.probability, active.outcome),
      category: rq.view.latest.content.category.clone(),
    })
    .collect()
}

/// Recompute and upsert every score record. Idempotent: a second pass over
/// unchanged inputs reports everything `unchanged`.
pub async fn score_all<S: ForecastStore>(store: &S) -> Result<ScoringReport> {
  let mut report = ScoringReport::default();

  for rq in store.resolved_questions().await.map_err(Error::store)? {
    let question_id = rq.view.question.question_id;
    report.questions += 1;

    let forecasts = store.forecasts_for(question_id).await.map_err(Error::store)?;
    let records = score_question(&rq, &forecasts);
    if records.is_empty() {
      report.no_eligible_forecast += 1;
    }

    let keep: Vec<String> = records.iter().map(|r| r.forecaster_id.clone()).collect();
    for record in records {
      debug_assert!(record.forecast_as_of <= record.cutoff);
      match store.upsert_score(record).await {
        Ok(ScoreChange::Inserted) => report.inserted += 1,
        Ok(ScoreChange::Updated) => report.updated += 1,
        Ok(ScoreChange::Unchanged) => report.unchanged += 1,
        Err(e) => warn!(%question_id, error = %e, "score not stored"),
      }
    }
    report.pruned += store
      .prune_scores(question_id, keep)
      .await
      .map_err(Error::store)?;
  }

  info!(
    questions = report.questions,
    inserted = report.inserted,
    updated = report.updated,
    unchanged = report.unchanged,
    pruned = report.pruned,
    "scoring pass finished"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use augur_core::{
    question::{Question, QuestionContent, QuestionState, QuestionView, Snapshot},
    resolution::Resolution,
  };
  use chrono::{DateTime, TimeZone, Utc};
  use uuid::Uuid;

  use super::*;

  fn ts(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn resolved(resolutions: Vec<Resolution>) -> ResolvedQuestion {
    ResolvedQuestion {
      view: QuestionView {
        question: Question {
          question_id:        Uuid::nil(),
          source:             "test".into(),
          source_question_id: "q".into(),
          state:              QuestionState::Resolved,
          first_seen_at:      ts(0),
          state_changed_at:   Some(ts(500)),
          state_reason:       None,
        },
        latest:   Snapshot {
          snapshot_id:  Uuid::nil(),
          question_id:  Uuid::nil(),
          captured_at:  ts(0),
          content_hash: String::new(),
          content:      QuestionContent {
            text:            "Will X happen?".into(),
            background:      None,
            category:        Some("tech".into()),
            url:             None,
            open_date:       None,
            resolution_date: None,
            base_rate:       None,
          },
        },
      },
      resolutions,
    }
  }

  fn resolution(outcome: f64, resolved_at: i64, recorded_at: i64) -> Resolution {
    Resolution {
      resolution_id: Uuid::new_v4(),
      question_id: Uuid::nil(),
      outcome,
      resolved_at: ts(resolved_at),
      recorded_at: ts(recorded_at),
      source_confirmed: true,
    }
  }

  fn forecast(forecaster: &str, as_of: i64, p: f64) -> Forecast {
    Forecast {
      forecast_id: Uuid::new_v4(),
      question_id: Uuid::nil(),
      forecaster_id: forecaster.into(),
      as_of: ts(as_of),
      probability: p,
      raw_output: String::new(),
      reasoning: None,
      latency_ms: 0,
      retry_count: 0,
      clamped: false,
    }
  }

  #[test]
  fn uses_latest_forecast_at_or_before_cutoff() {
    let rq = resolved(vec![resolution(1.0, 100, 110)]);
    let forecasts = [
      forecast("m", 10, 0.2),
      forecast("m", 100, 0.8),
      // Made after the event: could have seen the outcome.
      forecast("m", 101, 1.0),
    ];
    let records = score_question(&rq, &forecasts);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].probability, 0.8);
    assert!((records[0].brier - 0.04).abs() < 1e-12);
    assert_eq!(records[0].category.as_deref(), Some("tech"));
  }

  #[test]
  fn forecaster_with_only_late_forecasts_is_unscored() {
    let rq = resolved(vec![resolution(0.0, 100, 110)]);
    let records = score_question(&rq, &[forecast("late", 200, 0.1), forecast("early", 50, 0.8)]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].forecaster_id, "early");
    assert!((records[0].brier - 0.64).abs() < 1e-12);
  }

  #[test]
  fn correction_changes_outcome_but_not_cutoff() {
    let first = resolution(1.0, 100, 110);
    let correction = resolution(0.0, 300, 310);
    let rq = resolved(vec![first, correction.clone()]);
    // A forecast between the first event and the correction stays ineligible.
    let records = score_question(&rq, &[forecast("m", 50, 0.3), forecast("m", 200, 0.0)]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cutoff, ts(100));
    assert_eq!(records[0].outcome, 0.0);
    assert_eq!(records[0].resolution_id, correction.resolution_id);
    assert!((records[0].brier - 0.09).abs() < 1e-12);
  }
}
