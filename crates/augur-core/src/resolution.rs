//! Resolutions: the recorded real-world outcome of a question.
//!
//! Resolution rows are append-only. The active resolution of a question is
//! the most recently recorded row; earlier rows stay so the first resolution
//! event can always be reconstructed after a venue correction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  question::{QuestionState, QuestionView},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
  pub resolution_id:    Uuid,
  pub question_id:      Uuid,
  /// 0.0 = no, 1.0 = yes; values in between are graded outcomes.
  pub outcome:          f64,
  /// When the venue says the question resolved, or when we observed it.
  pub resolved_at:      DateTime<Utc>,
  /// Server-assigned.
  pub recorded_at:      DateTime<Utc>,
  pub source_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct NewResolution {
  pub outcome:          f64,
  pub resolved_at:      DateTime<Utc>,
  pub source_confirmed: bool,
}

impl NewResolution {
  pub fn validate(&self) -> Result<()> {
    if self.outcome.is_finite() && (0.0..=1.0).contains(&self.outcome) {
      Ok(())
    } else {
      Err(Error::OutcomeOutOfRange(self.outcome))
    }
  }
}

/// Input to [`crate::store::ForecastStore::resolve_question`].
#[derive(Debug, Clone)]
pub enum ResolutionEvent {
  Resolved(NewResolution),
  Cancelled { reason: Option<String> },
  Invalid { reason: Option<String> },
}

impl ResolutionEvent {
  pub fn target_state(&self) -> QuestionState {
    match self {
      Self::Resolved(_) => QuestionState::Resolved,
      Self::Cancelled { .. } => QuestionState::Cancelled,
      Self::Invalid { .. } => QuestionState::Invalid,
    }
  }
}

/// What [`crate::store::ForecastStore::resolve_question`] did.
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
  /// First resolution: the row was appended and the question moved to
  /// `Resolved` in the same transaction.
  Resolved(Resolution),
  /// The question was already resolved with a different outcome; a
  /// correction row was appended.
  Corrected(Resolution),
  /// The question moved to `Cancelled` or `Invalid`.
  Closed(QuestionState),
  /// Same outcome as the active resolution, or same terminal state; nothing
  /// written.
  Unchanged,
  /// The question is in a different terminal state; terminal states never
  /// change.
  Rejected { current: QuestionState },
}

/// A resolved question with its full resolution history, oldest first.
#[derive(Debug, Clone)]
pub struct ResolvedQuestion {
  pub view:        QuestionView,
  pub resolutions: Vec<Resolution>,
}

impl ResolvedQuestion {
  /// The most recently recorded resolution.
  pub fn active(&self) -> Option<&Resolution> {
    self.resolutions.iter().max_by_key(|r| r.recorded_at)
  }

  /// The earliest resolution event time across all rows. Forecasts made after
  /// this moment could have seen the outcome.
  pub fn cutoff(&self) -> Option<DateTime<Utc>> {
    self.resolutions.iter().map(|r| r.resolved_at).min()
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;
  use crate::question::{Question, QuestionContent, Snapshot};

  fn resolution(outcome: f64, resolved_secs: i64, recorded_secs: i64) -> Resolution {
    Resolution {
      resolution_id: Uuid::new_v4(),
      question_id: Uuid::nil(),
      outcome,
      resolved_at: Utc.timestamp_opt(resolved_secs, 0).unwrap(),
      recorded_at: Utc.timestamp_opt(recorded_secs, 0).unwrap(),
      source_confirmed: true,
    }
  }

  fn view() -> QuestionView {
    let ts = Utc.timestamp_opt(0, 0).unwrap();
    QuestionView {
      question: Question {
        question_id:        Uuid::nil(),
        source:             "test".into(),
        source_question_id: "q".into(),
        state:              QuestionState::Resolved,
        first_seen_at:      ts,
        state_changed_at:   Some(ts + Duration::days(1)),
        state_reason:       None,
      },
      latest:   Snapshot {
        snapshot_id:  Uuid::nil(),
        question_id:  Uuid::nil(),
        captured_at:  ts,
        content_hash: String::new(),
        content:      QuestionContent {
          text:            "q".into(),
          background:      None,
          category:        None,
          url:             None,
          open_date:       None,
          resolution_date: None,
          base_rate:       None,
        },
      },
    }
  }

  #[test]
  fn active_is_latest_recorded_and_cutoff_is_earliest_event() {
    let rq = ResolvedQuestion {
      view:        view(),
      resolutions: vec![resolution(1.0, 100, 150), resolution(0.0, 120, 300)],
    };
    assert_eq!(rq.active().unwrap().outcome, 0.0);
    assert_eq!(rq.cutoff().unwrap(), Utc.timestamp_opt(100, 0).unwrap());
  }

  #[test]
  fn outcome_bounds() {
    let ok = NewResolution {
      outcome:          0.37,
      resolved_at:      Utc::now(),
      source_confirmed: true,
    };
    assert!(ok.validate().is_ok());
    let bad = NewResolution { outcome: 1.2, ..ok };
    assert!(matches!(bad.validate(), Err(Error::OutcomeOutOfRange(_))));
  }
}
