//! Encoding and decoding helpers between Augur domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision and a `Z` suffix, so lexical order in SQL equals time order.
//! Question content is stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings.

use std::str::FromStr;

use augur_core::{
  forecast::{Forecast, ForecastErrorKind, ForecastFailure},
  question::{Question, QuestionContent, QuestionState, QuestionView, Snapshot},
  resolution::Resolution,
  score::ScoreRecord,
};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

/// Truncate to the precision the store keeps, so values handed back to
/// callers compare equal to what a later read returns.
pub fn normalize_dt(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn now() -> DateTime<Utc> { normalize_dt(Utc::now()) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Enums ────────────────────────────────────────────────────────────────────

pub fn encode_state(s: QuestionState) -> &'static str { s.into() }

pub fn decode_state(s: &str) -> Result<QuestionState> {
  QuestionState::from_str(s).map_err(|_| Error::UnknownValue {
    column: "state",
    value:  s.to_owned(),
  })
}

pub fn encode_error_kind(k: ForecastErrorKind) -> &'static str { k.into() }

pub fn decode_error_kind(s: &str) -> Result<ForecastErrorKind> {
  ForecastErrorKind::from_str(s).map_err(|_| Error::UnknownValue {
    column: "kind",
    value:  s.to_owned(),
  })
}

// ─── Content ──────────────────────────────────────────────────────────────────

pub fn encode_content(c: &QuestionContent) -> Result<String> {
  Ok(serde_json::to_string(c)?)
}

pub fn decode_content(s: &str) -> Result<QuestionContent> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawQuestion::from_row`].
pub const QUESTION_COLUMNS: &str = "q.question_id, q.source, q.source_question_id, q.state,
   q.first_seen_at, q.state_changed_at, q.state_reason";

/// Raw strings read directly from a `questions` row.
pub struct RawQuestion {
  pub question_id:        String,
  pub source:             String,
  pub source_question_id: String,
  pub state:              String,
  pub first_seen_at:      String,
  pub state_changed_at:   Option<String>,
  pub state_reason:       Option<String>,
}

impl RawQuestion {
  /// Read the seven [`QUESTION_COLUMNS`] starting at column `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      question_id:        row.get(offset)?,
      source:             row.get(offset + 1)?,
      source_question_id: row.get(offset + 2)?,
      state:              row.get(offset + 3)?,
      first_seen_at:      row.get(offset + 4)?,
      state_changed_at:   row.get(offset + 5)?,
      state_reason:       row.get(offset + 6)?,
    })
  }

  pub fn into_question(self) -> Result<Question> {
    Ok(Question {
      question_id:        decode_uuid(&self.question_id)?,
      source:             self.source,
      source_question_id: self.source_question_id,
      state:              decode_state(&self.state)?,
      first_seen_at:      decode_dt(&self.first_seen_at)?,
      state_changed_at:   decode_opt_dt(self.state_changed_at.as_deref())?,
      state_reason:       self.state_reason,
    })
  }
}

/// Column list matching [`RawSnapshot::from_row`].
pub const SNAPSHOT_COLUMNS: &str =
  "s.snapshot_id, s.question_id, s.captured_at, s.content_hash, s.content_json";

/// Raw strings read directly from a `snapshots` row.
pub struct RawSnapshot {
  pub snapshot_id:  String,
  pub question_id:  String,
  pub captured_at:  String,
  pub content_hash: String,
  pub content_json: String,
}

impl RawSnapshot {
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:  row.get(offset)?,
      question_id:  row.get(offset + 1)?,
      captured_at:  row.get(offset + 2)?,
      content_hash: row.get(offset + 3)?,
      content_json: row.get(offset + 4)?,
    })
  }

  pub fn into_snapshot(self) -> Result<Snapshot> {
    Ok(Snapshot {
      snapshot_id:  decode_uuid(&self.snapshot_id)?,
      question_id:  decode_uuid(&self.question_id)?,
      captured_at:  decode_dt(&self.captured_at)?,
      content_hash: self.content_hash,
      content:      decode_content(&self.content_json)?,
    })
  }
}

/// A `questions` row joined with its latest `snapshots` row.
pub struct RawQuestionView {
  pub question: RawQuestion,
  pub latest:   RawSnapshot,
}

impl RawQuestionView {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      question: RawQuestion::from_row(row, 0)?,
      latest:   RawSnapshot::from_row(row, 7)?,
    })
  }

  pub fn into_view(self) -> Result<QuestionView> {
    Ok(QuestionView {
      question: self.question.into_question()?,
      latest:   self.latest.into_snapshot()?,
    })
  }
}

pub const FORECAST_COLUMNS: &str = "forecast_id, question_id, forecaster_id, as_of, probability,
   raw_output, reasoning, latency_ms, retry_count, clamped";

/// Raw values read directly from a `forecasts` row.
pub struct RawForecast {
  pub forecast_id:   String,
  pub question_id:   String,
  pub forecaster_id: String,
  pub as_of:         String,
  pub probability:   f64,
  pub raw_output:    String,
  pub reasoning:     Option<String>,
  pub latency_ms:    i64,
  pub retry_count:   i64,
  pub clamped:       bool,
}

impl RawForecast {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      forecast_id:   row.get(0)?,
      question_id:   row.get(1)?,
      forecaster_id: row.get(2)?,
      as_of:         row.get(3)?,
      probability:   row.get(4)?,
      raw_output:    row.get(5)?,
      reasoning:     row.get(6)?,
      latency_ms:    row.get(7)?,
      retry_count:   row.get(8)?,
      clamped:       row.get(9)?,
    })
  }

  pub fn into_forecast(self) -> Result<Forecast> {
    Ok(Forecast {
      forecast_id:   decode_uuid(&self.forecast_id)?,
      question_id:   decode_uuid(&self.question_id)?,
      forecaster_id: self.forecaster_id,
      as_of:         decode_dt(&self.as_of)?,
      probability:   self.probability,
      raw_output:    self.raw_output,
      reasoning:     self.reasoning,
      latency_ms:    self.latency_ms.max(0) as u64,
      retry_count:   self.retry_count.max(0) as u32,
      clamped:       self.clamped,
    })
  }
}

pub const FAILURE_COLUMNS: &str =
  "failure_id, question_id, forecaster_id, kind, message, attempts, failed_at";

/// Raw values read directly from a `forecast_failures` row.
pub struct RawFailure {
  pub failure_id:    String,
  pub question_id:   String,
  pub forecaster_id: String,
  pub kind:          String,
  pub message:       String,
  pub attempts:      i64,
  pub failed_at:     String,
}

impl RawFailure {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      failure_id:    row.get(0)?,
      question_id:   row.get(1)?,
      forecaster_id: row.get(2)?,
      kind:          row.get(3)?,
      message:       row.get(4)?,
      attempts:      row.get(5)?,
      failed_at:     row.get(6)?,
    })
  }

  pub fn into_failure(self) -> Result<ForecastFailure> {
    Ok(ForecastFailure {
      failure_id:    decode_uuid(&self.failure_id)?,
      question_id:   decode_uuid(&self.question_id)?,
      forecaster_id: self.forecaster_id,
      kind:          decode_error_kind(&self.kind)?,
      message:       self.message,
      attempts:      self.attempts.max(0) as u32,
      failed_at:     decode_dt(&self.failed_at)?,
    })
  }
}

pub const RESOLUTION_COLUMNS: &str =
  "r.resolution_id, r.question_id, r.outcome, r.resolved_at, r.recorded_at, r.source_confirmed";

/// Raw values read directly from a `resolutions` row.
pub struct RawResolution {
  pub resolution_id:    String,
  pub question_id:      String,
  pub outcome:          f64,
  pub resolved_at:      String,
  pub recorded_at:      String,
  pub source_confirmed: bool,
}

impl RawResolution {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      resolution_id:    row.get(0)?,
      question_id:      row.get(1)?,
      outcome:          row.get(2)?,
      resolved_at:      row.get(3)?,
      recorded_at:      row.get(4)?,
      source_confirmed: row.get(5)?,
    })
  }

  pub fn into_resolution(self) -> Result<Resolution> {
    Ok(Resolution {
      resolution_id:    decode_uuid(&self.resolution_id)?,
      question_id:      decode_uuid(&self.question_id)?,
      outcome:          self.outcome,
      resolved_at:      decode_dt(&self.resolved_at)?,
      recorded_at:      decode_dt(&self.recorded_at)?,
      source_confirmed: self.source_confirmed,
    })
  }
}

pub const SCORE_COLUMNS: &str = "question_id, forecaster_id, forecast_id, forecast_as_of, probability,
   resolution_id, outcome, cutoff, brier, category";

/// Raw values of a `scores` row. Also used as the encoded form of a record
/// about to be written, so an upsert can compare old and new column by
/// column.
#[derive(Debug, Clone, PartialEq)]
pub struct RawScore {
  pub question_id:    String,
  pub forecaster_id:  String,
  pub forecast_id:    String,
  pub forecast_as_of: String,
  pub probability:    f64,
  pub resolution_id:  String,
  pub outcome:        f64,
  pub cutoff:         String,
  pub brier:          f64,
  pub category:       Option<String>,
}

impl RawScore {
  pub fn encode(r: &ScoreRecord) -> Self {
    Self {
      question_id:    encode_uuid(r.question_id),
      forecaster_id:  r.forecaster_id.clone(),
      forecast_id:    encode_uuid(r.forecast_id),
      forecast_as_of: encode_dt(r.forecast_as_of),
      probability:    r.probability,
      resolution_id:  encode_uuid(r.resolution_id),
      outcome:        r.outcome,
      cutoff:         encode_dt(r.cutoff),
      brier:          r.brier,
      category:       r.category.clone(),
    }
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      question_id:    row.get(0)?,
      forecaster_id:  row.get(1)?,
      forecast_id:    row.get(2)?,
      forecast_as_of: row.get(3)?,
      probability:    row.get(4)?,
      resolution_id:  row.get(5)?,
      outcome:        row.get(6)?,
      cutoff:         row.get(7)?,
      brier:          row.get(8)?,
      category:       row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<ScoreRecord> {
    Ok(ScoreRecord {
      question_id:    decode_uuid(&self.question_id)?,
      forecaster_id:  self.forecaster_id,
      forecast_id:    decode_uuid(&self.forecast_id)?,
      forecast_as_of: decode_dt(&self.forecast_as_of)?,
      probability:    self.probability,
      resolution_id:  decode_uuid(&self.resolution_id)?,
      outcome:        self.outcome,
      cutoff:         decode_dt(&self.cutoff)?,
      brier:          self.brier,
      category:       self.category,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_sortable() {
    let a = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
    let b = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
    let (ea, eb) = (encode_dt(a), encode_dt(b));
    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn normalize_truncates_to_micros() {
    let dt = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
    let n = normalize_dt(dt);
    assert_eq!(decode_dt(&encode_dt(dt)).unwrap(), n);
    assert_eq!(n.timestamp_subsec_nanos(), 123_456_000);
  }

  #[test]
  fn unknown_state_is_rejected() {
    assert!(matches!(
      decode_state("pending"),
      Err(Error::UnknownValue { column: "state", .. })
    ));
    assert_eq!(decode_state("resolved").unwrap(), QuestionState::Resolved);
  }
}
