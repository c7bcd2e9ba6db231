//! Ingestion: venue records → questions and deduplicated snapshots.
//!
//! Every registered adapter is fetched in parallel (bounded by
//! `max_concurrent_sources`). The records of one adapter are then written
//! sequentially by the same task, and identities embed the source name, so
//! snapshot writes for any one question are totally ordered.

use std::sync::Arc;

use augur_core::{
  question::{QuestionContent, QuestionKey},
  source::{RawQuestion, SourceAdapter},
  store::ForecastStore,
};
use serde::Serialize;
use tokio::{
  sync::Semaphore,
  task::JoinSet,
  time::{Instant, timeout_at},
};
use tracing::{debug, info, warn};

use crate::{
  Error,
  config::{IngestConfig, deadline_from_now},
  error::ValidationError,
  registry::SourceRegistry,
};

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Trim and collapse internal whitespace runs to a single space.
fn collapse(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

/// Canonicalise a venue record into its source question id and content.
pub fn normalize(raw: RawQuestion) -> Result<(String, QuestionContent), ValidationError> {
  let id = raw.source_question_id.trim().to_owned();
  if id.is_empty() {
    return Err(ValidationError::EmptyId);
  }
  let text = collapse(&raw.text);
  if text.is_empty() {
    return Err(ValidationError::EmptyText);
  }
  if let Some(p) = raw.base_rate
    && !(p.is_finite() && (0.0..=1.0).contains(&p))
  {
    return Err(ValidationError::BaseRateOutOfRange(p));
  }

  let content = QuestionContent {
    text,
    background: non_empty(raw.background.map(|b| collapse(&b))),
    category: non_empty(raw.category).map(|c| c.to_lowercase()),
    url: non_empty(raw.url),
    open_date: raw.open_date,
    resolution_date: raw.resolution_date,
    base_rate: raw.base_rate,
  };
  Ok((id, content))
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// What happened to one venue record.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
  /// First sighting: question and first snapshot written.
  Created,
  /// Known question, content changed: a new snapshot was written.
  Updated,
  Unchanged,
  Skipped(ValidationError),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
  pub source:        String,
  pub fetched:       usize,
  pub created:       usize,
  pub updated:       usize,
  pub unchanged:     usize,
  pub skipped:       usize,
  /// Records whose store write failed.
  pub write_errors:  usize,
  /// Set when the fetch itself failed; no records were processed.
  pub error:         Option<String>,
  /// The cycle deadline passed before every record was written.
  pub deadline_hit:  bool,
}

impl SourceReport {
  fn new(source: &str) -> Self {
    Self { source: source.to_owned(), ..Default::default() }
  }

  fn count(&mut self, outcome: &ItemOutcome) {
    match outcome {
      ItemOutcome::Created => self.created += 1,
      ItemOutcome::Updated => self.updated += 1,
      ItemOutcome::Unchanged => self.unchanged += 1,
      ItemOutcome::Skipped(_) => self.skipped += 1,
    }
  }

  pub fn succeeded(&self) -> bool { self.error.is_none() }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
  pub sources: Vec<SourceReport>,
}

impl IngestReport {
  /// A cycle succeeds iff at least one source fetched successfully.
  pub fn succeeded(&self) -> bool { self.sources.iter().any(SourceReport::succeeded) }

  pub fn source(&self, name: &str) -> Option<&SourceReport> {
    self.sources.iter().find(|s| s.source == name)
  }

  pub fn created(&self) -> usize { self.sources.iter().map(|s| s.created).sum() }

  pub fn updated(&self) -> usize { self.sources.iter().map(|s| s.updated).sum() }
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

pub struct IngestionCoordinator<S> {
  store:    Arc<S>,
  registry: Arc<SourceRegistry>,
  config:   IngestConfig,
}

impl<S> IngestionCoordinator<S>
where
  S: ForecastStore + 'static,
{
  pub fn new(store: Arc<S>, registry: Arc<SourceRegistry>, config: IngestConfig) -> Self {
    Self { store, registry, config }
  }

  /// Run one ingestion cycle over every registered source.
  pub async fn run(&self) -> IngestReport {
    let deadline = deadline_from_now(self.config.cycle_timeout());
    let permits = Arc::new(Semaphore::new(self.config.max_concurrent_sources.max(1)));
    let mut tasks = JoinSet::new();

    for adapter in self.registry.iter() {
      let adapter = Arc::clone(adapter);
      let store = Arc::clone(&self.store);
      let permits = Arc::clone(&permits);
      tasks.spawn(async move {
        let _permit = permits.acquire_owned().await;
        ingest_source(store.as_ref(), adapter.as_ref(), deadline).await
      });
    }

    let mut report = IngestReport::default();
    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok(source) => report.sources.push(source),
        Err(e) => warn!(error = %e, "ingestion task panicked"),
      }
    }
    // Registration order, regardless of completion order.
    let order = self.registry.names();
    report
      .sources
      .sort_by_key(|s| order.iter().position(|n| *n == s.source));

    info!(
      sources = report.sources.len(),
      succeeded = report.sources.iter().filter(|s| s.succeeded()).count(),
      created = report.created(),
      updated = report.updated(),
      "ingestion cycle finished"
    );
    report
  }
}

async fn ingest_source<S: ForecastStore>(
  store: &S,
  adapter: &dyn SourceAdapter,
  deadline: Instant,
) -> SourceReport {
  let source = adapter.name();
  let mut report = SourceReport::new(source);

  let records = match timeout_at(deadline, adapter.fetch_questions()).await {
    Ok(Ok(records)) => records,
    Ok(Err(e)) => {
      warn!(source, error = %e, "source fetch failed");
      report.error = Some(e.to_string());
      return report;
    }
    Err(_) => {
      warn!(source, "source fetch hit the cycle deadline");
      report.error = Some("cycle deadline exceeded during fetch".into());
      report.deadline_hit = true;
      return report;
    }
  };
  report.fetched = records.len();

  for raw in records {
    if Instant::now() >= deadline {
      warn!(source, "cycle deadline reached; remaining records left for next cycle");
      report.deadline_hit = true;
      break;
    }
    let raw_id = raw.source_question_id.clone();
    match ingest_record(store, source, raw).await {
      Ok(outcome) => {
        if let ItemOutcome::Skipped(ref reason) = outcome {
          warn!(source, source_question_id = %raw_id, %reason, "record skipped");
        }
        report.count(&outcome);
      }
      Err(e) => {
        warn!(source, source_question_id = %raw_id, error = %e, "record write failed");
        report.write_errors += 1;
      }
    }
  }

  debug!(
    source,
    fetched = report.fetched,
    created = report.created,
    updated = report.updated,
    unchanged = report.unchanged,
    skipped = report.skipped,
    "source ingested"
  );
  report
}

/// Normalise one record and write it: upsert identity, then append a snapshot
/// if the content hash changed.
pub async fn ingest_record<S: ForecastStore>(
  store: &S,
  source: &str,
  raw: RawQuestion,
) -> crate::Result<ItemOutcome> {
  let (source_question_id, content) = match normalize(raw) {
    Ok(v) => v,
    Err(reason) => return Ok(ItemOutcome::Skipped(reason)),
  };

  let upsert = store
    .upsert_question(QuestionKey::new(source, source_question_id))
    .await
    .map_err(Error::store)?;
  let snapshot = store
    .append_snapshot_if_changed(upsert.question.question_id, content)
    .await
    .map_err(Error::store)?;

  Ok(match (upsert.created, snapshot) {
    (true, _) => ItemOutcome::Created,
    (false, Some(_)) => ItemOutcome::Updated,
    (false, None) => ItemOutcome::Unchanged,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raw(id: &str, text: &str) -> RawQuestion {
    RawQuestion {
      source_question_id: id.into(),
      text: text.into(),
      ..Default::default()
    }
  }

  #[test]
  fn normalize_canonicalises_fields() {
    let mut r = raw("  42 ", "  Will   X\n happen?  ");
    r.background = Some("   ".into());
    r.category = Some(" Politics ".into());
    r.url = Some(String::new());
    let (id, c) = normalize(r).unwrap();
    assert_eq!(id, "42");
    assert_eq!(c.text, "Will X happen?");
    assert_eq!(c.background, None);
    assert_eq!(c.category.as_deref(), Some("politics"));
    assert_eq!(c.url, None);
  }

  #[test]
  fn whitespace_only_differences_hash_equal() {
    let (_, a) = normalize(raw("1", "Will X happen?")).unwrap();
    let (_, b) = normalize(raw("1", " Will  X happen? ")).unwrap();
    assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
  }

  #[test]
  fn normalize_rejects_malformed() {
    assert_eq!(normalize(raw(" ", "q")).unwrap_err(), ValidationError::EmptyId);
    assert_eq!(normalize(raw("1", "  ")).unwrap_err(), ValidationError::EmptyText);
    let mut r = raw("1", "q");
    r.base_rate = Some(1.5);
    assert_eq!(normalize(r).unwrap_err(), ValidationError::BaseRateOutOfRange(1.5));
  }
}
