//! Integration tests for `SqliteStore` against an in-memory database.

use augur_core::{
  forecast::{ForecastErrorKind, NewForecast, NewForecastFailure},
  question::{QuestionContent, QuestionKey, QuestionState},
  resolution::{NewResolution, ResolutionEvent, ResolveOutcome},
  score::{ScoreChange, ScoreFilter, ScoreRecord, brier},
  store::{ForecastFilter, ForecastStore},
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn ts(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

fn content(text: &str) -> QuestionContent {
  QuestionContent {
    text:            text.into(),
    background:      None,
    category:        Some("science".into()),
    url:             Some("https://example.com/q".into()),
    open_date:       Some(ts(1_700_000_000)),
    resolution_date: NaiveDate::from_ymd_opt(2025, 6, 1),
    base_rate:       Some(0.3),
  }
}

/// Create a question with one snapshot and return its id.
async fn seeded(s: &SqliteStore, sqid: &str) -> Uuid {
  let up = s
    .upsert_question(QuestionKey::new("test", sqid))
    .await
    .unwrap();
  s.append_snapshot_if_changed(up.question.question_id, content(sqid))
    .await
    .unwrap();
  up.question.question_id
}

fn forecast(question_id: Uuid, forecaster: &str, as_of: DateTime<Utc>, p: f64) -> NewForecast {
  NewForecast {
    question_id,
    forecaster_id: forecaster.into(),
    as_of,
    probability: p,
    raw_output: format!("{{\"probability\": {p}}}"),
    reasoning: None,
    latency_ms: 120,
    retry_count: 0,
    clamped: false,
  }
}

fn resolved(outcome: f64, at: DateTime<Utc>) -> ResolutionEvent {
  ResolutionEvent::Resolved(NewResolution {
    outcome,
    resolved_at: at,
    source_confirmed: true,
  })
}

// ─── Questions & snapshots ───────────────────────────────────────────────────

#[tokio::test]
async fn upsert_question_is_idempotent() {
  let s = store().await;
  let key = QuestionKey::new("manifold", "abc");

  let first = s.upsert_question(key.clone()).await.unwrap();
  assert!(first.created);
  assert_eq!(first.question.state, QuestionState::Open);
  assert_eq!(first.question.question_id, key.question_id());

  let second = s.upsert_question(key).await.unwrap();
  assert!(!second.created);
  assert_eq!(second.question, first.question);
}

#[tokio::test]
async fn get_question_missing_returns_none() {
  let s = store().await;
  assert!(s.get_question(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn unchanged_content_appends_no_snapshot() {
  let s = store().await;
  let id = seeded(&s, "q1").await;

  let again = s.append_snapshot_if_changed(id, content("q1")).await.unwrap();
  assert!(again.is_none());
  assert_eq!(s.snapshots(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn changed_content_appends_and_becomes_latest() {
  let s = store().await;
  let id = seeded(&s, "q1").await;

  let mut next = content("q1");
  next.base_rate = Some(0.35);
  let snap = s
    .append_snapshot_if_changed(id, next.clone())
    .await
    .unwrap()
    .expect("new snapshot");
  assert_eq!(snap.content, next);

  let history = s.snapshots(id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].content.base_rate, Some(0.3));
  assert_eq!(s.latest_snapshot(id).await.unwrap().unwrap(), snap);

  // Reverting to the earlier content is still a change relative to latest.
  let back = s.append_snapshot_if_changed(id, content("q1")).await.unwrap();
  assert!(back.is_some());
  assert_eq!(s.snapshots(id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn snapshot_for_unknown_question_fails() {
  let s = store().await;
  let err = s
    .append_snapshot_if_changed(Uuid::new_v4(), content("x"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::QuestionNotFound(_)));
}

async fn snapshot_seqs(s: &SqliteStore, question_id: Uuid) -> Vec<i64> {
  let id_str = crate::encode::encode_uuid(question_id);
  s.conn
    .call(move |conn| {
      let mut stmt = conn
        .prepare("SELECT seq FROM snapshots WHERE question_id = ?1 ORDER BY seq")?;
      let seqs = stmt
        .query_map(rusqlite::params![id_str], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
      Ok(seqs)
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn concurrent_identical_appends_store_one_snapshot() {
  let s = store().await;
  let id = s
    .upsert_question(QuestionKey::new("test", "race"))
    .await
    .unwrap()
    .question
    .question_id;

  let tasks: Vec<_> = (0..16)
    .map(|_| {
      let s = s.clone();
      tokio::spawn(async move { s.append_snapshot_if_changed(id, content("race")).await })
    })
    .collect();
  let mut appended = 0;
  for task in tasks {
    if task.await.unwrap().unwrap().is_some() {
      appended += 1;
    }
  }

  assert_eq!(appended, 1);
  assert_eq!(s.snapshots(id).await.unwrap().len(), 1);
  assert_eq!(snapshot_seqs(&s, id).await, vec![1]);
}

#[tokio::test]
async fn concurrent_distinct_appends_get_gapless_seqs() {
  const N: i64 = 16;
  let s = store().await;
  let id = s
    .upsert_question(QuestionKey::new("test", "race"))
    .await
    .unwrap()
    .question
    .question_id;

  let tasks: Vec<_> = (0..N)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move {
        s.append_snapshot_if_changed(id, content(&format!("revision {i}")))
          .await
      })
    })
    .collect();
  for task in tasks {
    assert!(task.await.unwrap().unwrap().is_some());
  }

  assert_eq!(snapshot_seqs(&s, id).await, (1..=N).collect::<Vec<_>>());
  assert_eq!(s.snapshots(id).await.unwrap().len(), N as usize);
}

#[tokio::test]
async fn list_questions_filters_by_state_and_skips_unsnapshotted() {
  let s = store().await;
  let a = seeded(&s, "a").await;
  let _b = seeded(&s, "b").await;
  s.upsert_question(QuestionKey::new("test", "bare")).await.unwrap();

  s.resolve_question(a, ResolutionEvent::Cancelled { reason: None })
    .await
    .unwrap();

  assert_eq!(s.list_questions(None).await.unwrap().len(), 2);
  let open = s.open_questions().await.unwrap();
  assert_eq!(open.len(), 1);
  assert_eq!(open[0].question.source_question_id, "b");
  let cancelled = s.list_questions(Some(QuestionState::Cancelled)).await.unwrap();
  assert_eq!(cancelled.len(), 1);
  assert_eq!(cancelled[0].latest.content.text, "a");
}

// ─── Forecasts ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_forecast_is_idempotent_on_key() {
  let s = store().await;
  let id = seeded(&s, "q").await;

  let f1 = s.append_forecast(forecast(id, "gpt", ts(1000), 0.6)).await.unwrap();
  let f2 = s.append_forecast(forecast(id, "gpt", ts(1000), 0.6)).await.unwrap();
  assert_eq!(f1.forecast_id, f2.forecast_id);
  assert_eq!(s.forecasts_for(id).await.unwrap().len(), 1);

  s.append_forecast(forecast(id, "gpt", ts(2000), 0.7)).await.unwrap();
  let all = s.forecasts_for(id).await.unwrap();
  assert_eq!(all.len(), 2);
  assert!(all[0].as_of < all[1].as_of);
}

#[tokio::test]
async fn append_forecast_rejects_out_of_range() {
  let s = store().await;
  let id = seeded(&s, "q").await;
  let err = s
    .append_forecast(forecast(id, "gpt", ts(1000), 1.2))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(_)));
  assert!(s.forecasts_for(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn forecasts_frozen_after_resolution() {
  let s = store().await;
  let id = seeded(&s, "q").await;
  s.append_forecast(forecast(id, "gpt", ts(1000), 0.6)).await.unwrap();
  s.resolve_question(id, resolved(1.0, ts(1500))).await.unwrap();

  let err = s
    .append_forecast(forecast(id, "gpt", ts(2000), 0.9))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::QuestionNotOpen { state: QuestionState::Resolved, .. }
  ));

  // A retry of the write that landed before resolution still succeeds.
  let replay = s.append_forecast(forecast(id, "gpt", ts(1000), 0.6)).await;
  assert!(replay.is_ok());
}

#[tokio::test]
async fn list_forecasts_filters() {
  let s = store().await;
  let q1 = seeded(&s, "q1").await;
  let q2 = seeded(&s, "q2").await;
  s.append_forecast(forecast(q1, "a", ts(100), 0.1)).await.unwrap();
  s.append_forecast(forecast(q1, "b", ts(200), 0.2)).await.unwrap();
  s.append_forecast(forecast(q2, "a", ts(300), 0.3)).await.unwrap();

  let by_a = ForecastFilter { forecaster_id: Some("a".into()), ..Default::default() };
  assert_eq!(s.list_forecasts(&by_a).await.unwrap().len(), 2);

  let since = ForecastFilter { since: Some(ts(200)), ..Default::default() };
  assert_eq!(s.list_forecasts(&since).await.unwrap().len(), 2);

  let pair = ForecastFilter {
    forecaster_id: Some("a".into()),
    question_id:   Some(q2),
    since:         None,
  };
  let got = s.list_forecasts(&pair).await.unwrap();
  assert_eq!(got.len(), 1);
  assert_eq!(got[0].probability, 0.3);
}

#[tokio::test]
async fn failures_are_recorded_separately() {
  let s = store().await;
  let id = seeded(&s, "q").await;
  let failure = s
    .record_forecast_failure(NewForecastFailure {
      question_id:   id,
      forecaster_id: "gpt".into(),
      kind:          ForecastErrorKind::InvalidOutput,
      message:       "no probability in response".into(),
      attempts:      1,
    })
    .await
    .unwrap();

  let all = s.forecast_failures(Some(id)).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].failure_id, failure.failure_id);
  assert_eq!(all[0].kind, ForecastErrorKind::InvalidOutput);
  assert!(s.forecasts_for(id).await.unwrap().is_empty());
}

// ─── Resolutions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_moves_state_and_records_row() {
  let s = store().await;
  let id = seeded(&s, "q").await;

  let out = s.resolve_question(id, resolved(1.0, ts(5000))).await.unwrap();
  let ResolveOutcome::Resolved(r) = out else {
    panic!("expected first resolution, got {out:?}");
  };
  assert_eq!(r.outcome, 1.0);
  assert_eq!(r.resolved_at, ts(5000));

  let q = s.get_question(id).await.unwrap().unwrap();
  assert_eq!(q.state, QuestionState::Resolved);
  assert!(q.state_changed_at.is_some());
  assert_eq!(s.resolutions_for(id).await.unwrap(), vec![r]);
}

#[tokio::test]
async fn same_outcome_is_unchanged_and_different_is_correction() {
  let s = store().await;
  let id = seeded(&s, "q").await;
  s.resolve_question(id, resolved(1.0, ts(5000))).await.unwrap();

  let again = s.resolve_question(id, resolved(1.0, ts(5100))).await.unwrap();
  assert!(matches!(again, ResolveOutcome::Unchanged));

  let corr = s.resolve_question(id, resolved(0.0, ts(5200))).await.unwrap();
  assert!(matches!(corr, ResolveOutcome::Corrected(ref r) if r.outcome == 0.0));

  let history = s.resolutions_for(id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].outcome, 1.0);
  assert_eq!(history[1].outcome, 0.0);

  let rq = s.resolved_questions().await.unwrap();
  assert_eq!(rq.len(), 1);
  assert_eq!(rq[0].active().unwrap().outcome, 0.0);
  assert_eq!(rq[0].cutoff(), Some(ts(5000)));
}

#[tokio::test]
async fn terminal_states_never_change() {
  let s = store().await;
  let id = seeded(&s, "q").await;

  let closed = s
    .resolve_question(id, ResolutionEvent::Cancelled { reason: Some("voided".into()) })
    .await
    .unwrap();
  assert!(matches!(closed, ResolveOutcome::Closed(QuestionState::Cancelled)));
  let q = s.get_question(id).await.unwrap().unwrap();
  assert_eq!(q.state_reason.as_deref(), Some("voided"));

  let repeat = s
    .resolve_question(id, ResolutionEvent::Cancelled { reason: None })
    .await
    .unwrap();
  assert!(matches!(repeat, ResolveOutcome::Unchanged));

  let late = s.resolve_question(id, resolved(1.0, ts(9000))).await.unwrap();
  assert!(matches!(
    late,
    ResolveOutcome::Rejected { current: QuestionState::Cancelled }
  ));
  assert!(s.resolutions_for(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_outcome_writes_nothing() {
  let s = store().await;
  let id = seeded(&s, "q").await;
  let err = s.resolve_question(id, resolved(1.5, ts(10))).await.unwrap_err();
  assert!(matches!(err, Error::Core(_)));
  let q = s.get_question(id).await.unwrap().unwrap();
  assert_eq!(q.state, QuestionState::Open);
}

#[tokio::test]
async fn resolve_unknown_question_fails() {
  let s = store().await;
  let err = s
    .resolve_question(Uuid::new_v4(), resolved(1.0, ts(10)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::QuestionNotFound(_)));
}

// ─── Scores ──────────────────────────────────────────────────────────────────

async fn scored_fixture(s: &SqliteStore) -> ScoreRecord {
  let id = seeded(s, "q").await;
  let f = s.append_forecast(forecast(id, "gpt", ts(1000), 0.7)).await.unwrap();
  let ResolveOutcome::Resolved(r) =
    s.resolve_question(id, resolved(1.0, ts(2000))).await.unwrap()
  else {
    panic!("expected resolution");
  };
  ScoreRecord {
    question_id:    id,
    forecaster_id:  "gpt".into(),
    forecast_id:    f.forecast_id,
    forecast_as_of: f.as_of,
    probability:    f.probability,
    resolution_id:  r.resolution_id,
    outcome:        r.outcome,
    cutoff:         r.resolved_at,
    brier:          brier(f.probability, r.outcome),
    category:       Some("science".into()),
  }
}

#[tokio::test]
async fn upsert_score_classifies_changes() {
  let s = store().await;
  let record = scored_fixture(&s).await;

  assert_eq!(s.upsert_score(record.clone()).await.unwrap(), ScoreChange::Inserted);
  assert_eq!(s.upsert_score(record.clone()).await.unwrap(), ScoreChange::Unchanged);

  let mut changed = record.clone();
  changed.category = Some("physics".into());
  assert_eq!(s.upsert_score(changed.clone()).await.unwrap(), ScoreChange::Updated);

  let stored = s.score_records(&ScoreFilter::default()).await.unwrap();
  assert_eq!(stored, vec![changed]);
}

#[tokio::test]
async fn score_filters_and_prune() {
  let s = store().await;
  let record = scored_fixture(&s).await;
  s.upsert_score(record.clone()).await.unwrap();

  let by_cat = ScoreFilter { category: Some("science".into()), ..Default::default() };
  assert_eq!(s.score_records(&by_cat).await.unwrap().len(), 1);

  let later = ScoreFilter {
    cutoff_after: Some(record.cutoff + Duration::seconds(1)),
    ..Default::default()
  };
  assert!(s.score_records(&later).await.unwrap().is_empty());

  let before = ScoreFilter {
    cutoff_before: Some(record.cutoff + Duration::seconds(1)),
    ..Default::default()
  };
  assert_eq!(s.score_records(&before).await.unwrap().len(), 1);

  assert_eq!(s.prune_scores(record.question_id, vec!["gpt".into()]).await.unwrap(), 0);
  assert_eq!(s.prune_scores(record.question_id, vec![]).await.unwrap(), 1);
  assert!(s.score_records(&ScoreFilter::default()).await.unwrap().is_empty());
}
