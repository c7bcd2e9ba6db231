//! Questions and their snapshots.
//!
//! A question is identified by the venue it came from and the venue's own id.
//! Everything else about it (wording, background, dates) may change between
//! ingestion runs, so those fields live in immutable, content-addressed
//! [`Snapshot`]s. The question row itself only carries identity and the
//! lifecycle [`QuestionState`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

/// Namespace for deriving stable question UUIDs from venue identities.
const QUESTION_NAMESPACE: Uuid =
  Uuid::from_u128(0x6b1f_4d2e_93a0_4c57_8e21_5f0d_aa3c_7e19);

// ─── Identity ────────────────────────────────────────────────────────────────

/// The immutable identity of a question: `(source_name, source_question_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionKey {
  pub source:             String,
  pub source_question_id: String,
}

impl QuestionKey {
  pub fn new(
    source: impl Into<String>,
    source_question_id: impl Into<String>,
  ) -> Self {
    Self {
      source:             source.into(),
      source_question_id: source_question_id.into(),
    }
  }

  /// Deterministic UUIDv5 for this identity. The same venue question maps to
  /// the same id on every machine and every run.
  pub fn question_id(&self) -> Uuid {
    let mut name =
      Vec::with_capacity(self.source.len() + self.source_question_id.len() + 1);
    name.extend_from_slice(self.source.as_bytes());
    // Unit separator: cannot appear in either component after normalisation.
    name.push(0x1f);
    name.extend_from_slice(self.source_question_id.as_bytes());
    Uuid::new_v5(&QUESTION_NAMESPACE, &name)
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle state of a question. Only `Open` may transition; the other three
/// are terminal.
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
pub enum QuestionState {
  Open,
  Resolved,
  Cancelled,
  Invalid,
}

impl QuestionState {
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Open) }

  pub fn can_transition_to(self, next: QuestionState) -> bool {
    matches!(
      (self, next),
      (Self::Open, Self::Resolved | Self::Cancelled | Self::Invalid)
    )
  }

  /// Validate a transition, returning the new state.
  pub fn transition(self, next: QuestionState) -> Result<QuestionState> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::IllegalTransition { from: self, to: next })
    }
  }
}

// ─── Question ────────────────────────────────────────────────────────────────

/// The identity envelope for a venue question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
  pub question_id:        Uuid,
  pub source:             String,
  pub source_question_id: String,
  pub state:              QuestionState,
  /// Set by the store when the question was first ingested.
  pub first_seen_at:      DateTime<Utc>,
  /// When the question left `Open`, if it has.
  pub state_changed_at:   Option<DateTime<Utc>>,
  /// Free-text reason attached to a cancelled or invalid transition.
  pub state_reason:       Option<String>,
}

impl Question {
  pub fn key(&self) -> QuestionKey {
    QuestionKey::new(self.source.clone(), self.source_question_id.clone())
  }
}

/// Result of [`crate::store::ForecastStore::upsert_question`].
#[derive(Debug, Clone)]
pub struct QuestionUpsert {
  pub question: Question,
  /// `true` if this call created the question.
  pub created:  bool,
}

// ─── Content & snapshots ─────────────────────────────────────────────────────

/// The mutable, venue-supplied fields of a question in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContent {
  pub text:            String,
  pub background:      Option<String>,
  pub category:        Option<String>,
  pub url:             Option<String>,
  pub open_date:       Option<DateTime<Utc>>,
  /// The date the venue expects the question to resolve.
  pub resolution_date: Option<NaiveDate>,
  /// The venue's crowd probability at capture time, if it publishes one.
  pub base_rate:       Option<f64>,
}

impl QuestionContent {
  /// Hex SHA-256 over the canonical JSON form. Field order is fixed by the
  /// struct definition, so equal content always hashes equal.
  pub fn content_hash(&self) -> Result<String> {
    let bytes = serde_json::to_vec(self)?;
    let hash = Sha256::digest(&bytes);
    Ok(hex::encode(hash))
  }

  /// Whether the expected resolution date has been reached. Questions with no
  /// expected date are always considered due.
  pub fn is_due(&self, today: NaiveDate) -> bool {
    self.resolution_date.is_none_or(|d| d <= today)
  }
}

/// An immutable capture of a question's content at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub snapshot_id:  Uuid,
  pub question_id:  Uuid,
  /// Server-assigned; never changes after creation.
  pub captured_at:  DateTime<Utc>,
  pub content_hash: String,
  pub content:      QuestionContent,
}

/// A question bundled with its latest snapshot: the computed read model used
/// by every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
  pub question: Question,
  pub latest:   Snapshot,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn content(text: &str) -> QuestionContent {
    QuestionContent {
      text:            text.into(),
      background:      Some("Some context.".into()),
      category:        Some("politics".into()),
      url:             None,
      open_date:       None,
      resolution_date: NaiveDate::from_ymd_opt(2025, 1, 31),
      base_rate:       Some(0.4),
    }
  }

  #[test]
  fn question_id_is_stable_and_source_scoped() {
    let a = QuestionKey::new("manifold", "abc");
    let b = QuestionKey::new("manifold", "abc");
    let c = QuestionKey::new("good_judgment", "abc");
    assert_eq!(a.question_id(), b.question_id());
    assert_ne!(a.question_id(), c.question_id());
  }

  #[test]
  fn question_id_does_not_collide_on_concatenation() {
    let a = QuestionKey::new("ab", "c");
    let b = QuestionKey::new("a", "bc");
    assert_ne!(a.question_id(), b.question_id());
  }

  #[test]
  fn equal_content_hashes_equal() {
    let h1 = content("Will X happen?").content_hash().unwrap();
    let h2 = content("Will X happen?").content_hash().unwrap();
    assert_eq!(h1, h2);
    assert_eq!(h1.len(), 64);
  }

  #[test]
  fn changed_field_changes_hash() {
    let a = content("Will X happen?");
    let mut b = a.clone();
    b.base_rate = Some(0.41);
    assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
  }

  #[test]
  fn only_open_transitions() {
    use QuestionState::*;
    assert!(Open.can_transition_to(Resolved));
    assert!(Open.can_transition_to(Cancelled));
    assert!(Open.can_transition_to(Invalid));
    assert!(!Open.can_transition_to(Open));
    for terminal in [Resolved, Cancelled, Invalid] {
      assert!(terminal.is_terminal());
      for next in [Open, Resolved, Cancelled, Invalid] {
        assert!(terminal.transition(next).is_err());
      }
    }
  }

  #[test]
  fn state_string_roundtrip() {
    use std::str::FromStr;
    for s in [
      QuestionState::Open,
      QuestionState::Resolved,
      QuestionState::Cancelled,
      QuestionState::Invalid,
    ] {
      assert_eq!(QuestionState::from_str(&s.to_string()).unwrap(), s);
    }
    assert_eq!(QuestionState::Cancelled.to_string(), "cancelled");
  }

  #[test]
  fn due_when_date_reached_or_unknown() {
    let today = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
    let mut c = content("q");
    assert!(c.is_due(today));
    assert!(!c.is_due(today.pred_opt().unwrap()));
    c.resolution_date = None;
    assert!(c.is_due(today));
  }
}
