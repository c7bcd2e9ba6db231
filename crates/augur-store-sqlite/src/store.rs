//! [`SqliteStore`]: the SQLite implementation of [`ForecastStore`].

use std::{collections::HashMap, path::Path};

use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use augur_core::{
  forecast::{Forecast, ForecastFailure, NewForecast, NewForecastFailure},
  question::{
    Question, QuestionContent, QuestionKey, QuestionState, QuestionUpsert,
    QuestionView, Snapshot,
  },
  resolution::{Resolution, ResolutionEvent, ResolveOutcome, ResolvedQuestion},
  score::{ScoreChange, ScoreFilter, ScoreRecord},
  store::{ForecastFilter, ForecastStore},
};

use crate::{
  encode::{
    decode_state, encode_content, encode_dt, encode_error_kind, encode_state,
    encode_uuid, normalize_dt, now, RawFailure, RawForecast, RawQuestion,
    RawQuestionView, RawResolution, RawScore, RawSnapshot, FAILURE_COLUMNS,
    FORECAST_COLUMNS, QUESTION_COLUMNS, RESOLUTION_COLUMNS, SCORE_COLUMNS,
    SNAPSHOT_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

/// What the resolve transaction found and did, in raw column form.
enum RawResolve {
  NotFound,
  Resolved(RawResolution),
  Corrected(RawResolution),
  Closed,
  Unchanged,
  Rejected(String),
}

/// What the forecast transaction found and did.
enum RawAppend {
  NotFound,
  NotOpen(String),
  Row(RawForecast),
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Augur forecast store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn select_question(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawQuestion>> {
  conn
    .query_row(
      &format!("SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.question_id = ?1"),
      rusqlite::params![id],
      |row| RawQuestion::from_row(row, 0),
    )
    .optional()
}

fn select_views(
  conn: &rusqlite::Connection,
  state: Option<&str>,
) -> rusqlite::Result<Vec<RawQuestionView>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {QUESTION_COLUMNS}, {SNAPSHOT_COLUMNS}
     FROM questions q
     JOIN snapshots s
       ON s.question_id = q.question_id
      AND s.seq = (SELECT MAX(seq) FROM snapshots WHERE question_id = q.question_id)
     WHERE (?1 IS NULL OR q.state = ?1)
     ORDER BY q.first_seen_at, q.question_id"
  ))?;
  stmt
    .query_map(rusqlite::params![state], RawQuestionView::from_row)?
    .collect()
}

fn select_forecast_by_key(
  conn: &rusqlite::Connection,
  question_id: &str,
  forecaster_id: &str,
  as_of: &str,
) -> rusqlite::Result<Option<RawForecast>> {
  conn
    .query_row(
      &format!(
        "SELECT {FORECAST_COLUMNS} FROM forecasts
         WHERE question_id = ?1 AND forecaster_id = ?2 AND as_of = ?3"
      ),
      rusqlite::params![question_id, forecaster_id, as_of],
      RawForecast::from_row,
    )
    .optional()
}

/// The highest-seq resolution row of a question.
fn select_active_resolution(
  conn: &rusqlite::Connection,
  question_id: &str,
) -> rusqlite::Result<Option<(i64, RawResolution)>> {
  conn
    .query_row(
      &format!(
        "SELECT {RESOLUTION_COLUMNS}, r.seq FROM resolutions r
         WHERE r.question_id = ?1 ORDER BY r.seq DESC LIMIT 1"
      ),
      rusqlite::params![question_id],
      |row| Ok((row.get(6)?, RawResolution::from_row(row)?)),
    )
    .optional()
}

// ─── ForecastStore impl ──────────────────────────────────────────────────────

impl ForecastStore for SqliteStore {
  type Error = Error;

  // ── Questions & snapshots ─────────────────────────────────────────────────

  async fn upsert_question(&self, key: QuestionKey) -> Result<QuestionUpsert> {
    let question_id = key.question_id();
    let id_str      = encode_uuid(question_id);
    let at_str      = encode_dt(now());
    let source      = key.source;
    let source_qid  = key.source_question_id;

    let (created, raw): (bool, Option<RawQuestion>) = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT OR IGNORE INTO questions
             (question_id, source, source_question_id, state, first_seen_at)
           VALUES (?1, ?2, ?3, 'open', ?4)",
          rusqlite::params![id_str, source, source_qid, at_str],
        )?;
        Ok((inserted == 1, select_question(conn, &id_str)?))
      })
      .await?;

    let question = raw
      .ok_or(Error::QuestionNotFound(question_id))?
      .into_question()?;
    if created {
      debug!(%question_id, source = %question.source, "new question");
    }
    Ok(QuestionUpsert { question, created })
  }

  async fn get_question(&self, question_id: Uuid) -> Result<Option<Question>> {
    let id_str = encode_uuid(question_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_question(conn, &id_str)?))
      .await?;
    raw.map(RawQuestion::into_question).transpose()
  }

  async fn append_snapshot_if_changed(
    &self,
    question_id: Uuid,
    content: QuestionContent,
  ) -> Result<Option<Snapshot>> {
    let content = QuestionContent {
      open_date: content.open_date.map(normalize_dt),
      ..content
    };
    let hash = content.content_hash()?;
    let snapshot = Snapshot {
      snapshot_id: Uuid::new_v4(),
      question_id,
      captured_at: now(),
      content_hash: hash,
      content,
    };

    let snap_id_str = encode_uuid(snapshot.snapshot_id);
    let q_id_str    = encode_uuid(question_id);
    let at_str      = encode_dt(snapshot.captured_at);
    let hash_str    = snapshot.content_hash.clone();
    let json_str    = encode_content(&snapshot.content)?;

    let outcome: Option<bool> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if select_question(&tx, &q_id_str)?.is_none() {
          return Ok(None);
        }
        let latest: Option<(i64, String)> = tx
          .query_row(
            "SELECT seq, content_hash FROM snapshots
             WHERE question_id = ?1 ORDER BY seq DESC LIMIT 1",
            rusqlite::params![q_id_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;

        if latest.as_ref().is_some_and(|(_, h)| *h == hash_str) {
          return Ok(Some(false));
        }
        let seq = latest.map_or(1, |(s, _)| s + 1);
        tx.execute(
          "INSERT INTO snapshots
             (snapshot_id, question_id, seq, captured_at, content_hash, content_json)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![snap_id_str, q_id_str, seq, at_str, hash_str, json_str],
        )?;
        tx.commit()?;
        Ok(Some(true))
      })
      .await?;

    match outcome {
      None => Err(Error::QuestionNotFound(question_id)),
      Some(false) => Ok(None),
      Some(true) => {
        debug!(%question_id, hash = %snapshot.content_hash, "snapshot appended");
        Ok(Some(snapshot))
      }
    }
  }

  async fn latest_snapshot(&self, question_id: Uuid) -> Result<Option<Snapshot>> {
    let id_str = encode_uuid(question_id);
    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM snapshots s
                 WHERE s.question_id = ?1 ORDER BY s.seq DESC LIMIT 1"
              ),
              rusqlite::params![id_str],
              |row| RawSnapshot::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  async fn snapshots(&self, question_id: Uuid) -> Result<Vec<Snapshot>> {
    let id_str = encode_uuid(question_id);
    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM snapshots s
           WHERE s.question_id = ?1 ORDER BY s.seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| RawSnapshot::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  async fn list_questions(
    &self,
    state: Option<QuestionState>,
  ) -> Result<Vec<QuestionView>> {
    let state_str = state.map(encode_state);
    let raws = self
      .conn
      .call(move |conn| Ok(select_views(conn, state_str)?))
      .await?;
    raws.into_iter().map(RawQuestionView::into_view).collect()
  }

  // ── Forecasts ─────────────────────────────────────────────────────────────

  async fn append_forecast(&self, input: NewForecast) -> Result<Forecast> {
    input.validate()?;

    let question_id = input.question_id;
    let f_id_str    = encode_uuid(Uuid::new_v4());
    let q_id_str    = encode_uuid(question_id);
    let as_of_str   = encode_dt(normalize_dt(input.as_of));
    let forecaster  = input.forecaster_id;
    let probability = input.probability;
    let raw_output  = input.raw_output;
    let reasoning   = input.reasoning;
    let latency     = i64::try_from(input.latency_ms).unwrap_or(i64::MAX);
    let retries     = i64::from(input.retry_count);
    let clamped     = input.clamped;

    let appended: RawAppend = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Some(existing) =
          select_forecast_by_key(&tx, &q_id_str, &forecaster, &as_of_str)?
        {
          return Ok(RawAppend::Row(existing));
        }
        let Some(question) = select_question(&tx, &q_id_str)? else {
          return Ok(RawAppend::NotFound);
        };
        if question.state != encode_state(QuestionState::Open) {
          return Ok(RawAppend::NotOpen(question.state));
        }
        tx.execute(
          "INSERT INTO forecasts
             (forecast_id, question_id, forecaster_id, as_of, probability,
              raw_output, reasoning, latency_ms, retry_count, clamped)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            f_id_str,
            q_id_str,
            forecaster,
            as_of_str,
            probability,
            raw_output,
            reasoning,
            latency,
            retries,
            clamped,
          ],
        )?;
        let row = select_forecast_by_key(&tx, &q_id_str, &forecaster, &as_of_str)?;
        tx.commit()?;
        Ok(row.map_or(RawAppend::NotFound, RawAppend::Row))
      })
      .await?;

    match appended {
      RawAppend::Row(raw) => raw.into_forecast(),
      RawAppend::NotFound => Err(Error::QuestionNotFound(question_id)),
      RawAppend::NotOpen(state) => Err(Error::QuestionNotOpen {
        question_id,
        state: decode_state(&state)?,
      }),
    }
  }

  async fn forecasts_for(&self, question_id: Uuid) -> Result<Vec<Forecast>> {
    let filter = ForecastFilter { question_id: Some(question_id), ..Default::default() };
    self.list_forecasts(&filter).await
  }

  async fn list_forecasts<'a>(&'a self, filter: &'a ForecastFilter) -> Result<Vec<Forecast>> {
    let forecaster = filter.forecaster_id.clone();
    let q_id_str   = filter.question_id.map(encode_uuid);
    let since_str  = filter.since.map(encode_dt);

    let raws: Vec<RawForecast> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FORECAST_COLUMNS} FROM forecasts
           WHERE (?1 IS NULL OR forecaster_id = ?1)
             AND (?2 IS NULL OR question_id = ?2)
             AND (?3 IS NULL OR as_of >= ?3)
           ORDER BY as_of, forecaster_id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![forecaster, q_id_str, since_str],
            RawForecast::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawForecast::into_forecast).collect()
  }

  async fn record_forecast_failure(
    &self,
    input: NewForecastFailure,
  ) -> Result<ForecastFailure> {
    let failure = ForecastFailure {
      failure_id:    Uuid::new_v4(),
      question_id:   input.question_id,
      forecaster_id: input.forecaster_id,
      kind:          input.kind,
      message:       input.message,
      attempts:      input.attempts,
      failed_at:     now(),
    };

    let id_str     = encode_uuid(failure.failure_id);
    let q_id_str   = encode_uuid(failure.question_id);
    let forecaster = failure.forecaster_id.clone();
    let kind_str   = encode_error_kind(failure.kind);
    let message    = failure.message.clone();
    let attempts   = i64::from(failure.attempts);
    let at_str     = encode_dt(failure.failed_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO forecast_failures
             (failure_id, question_id, forecaster_id, kind, message, attempts, failed_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, q_id_str, forecaster, kind_str, message, attempts, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(failure)
  }

  async fn forecast_failures(
    &self,
    question_id: Option<Uuid>,
  ) -> Result<Vec<ForecastFailure>> {
    let q_id_str = question_id.map(encode_uuid);
    let raws: Vec<RawFailure> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FAILURE_COLUMNS} FROM forecast_failures
           WHERE (?1 IS NULL OR question_id = ?1)
           ORDER BY failed_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![q_id_str], RawFailure::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawFailure::into_failure).collect()
  }

  // ── Resolutions ───────────────────────────────────────────────────────────

  async fn resolve_question(
    &self,
    question_id: Uuid,
    event: ResolutionEvent,
  ) -> Result<ResolveOutcome> {
    if let ResolutionEvent::Resolved(ref r) = event {
      r.validate()?;
    }

    let target     = event.target_state();
    let target_str = encode_state(target);
    let q_id_str   = encode_uuid(question_id);
    let res_id_str = encode_uuid(Uuid::new_v4());
    let now_str    = encode_dt(now());

    let raw: RawResolve = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(question) = select_question(&tx, &q_id_str)? else {
          return Ok(RawResolve::NotFound);
        };
        let open = encode_state(QuestionState::Open);
        let resolved = encode_state(QuestionState::Resolved);

        let outcome = match event {
          ResolutionEvent::Resolved(new) => {
            let resolved_at_str = encode_dt(normalize_dt(new.resolved_at));
            let insert = |seq: i64| -> rusqlite::Result<RawResolution> {
              tx.execute(
                "INSERT INTO resolutions
                   (resolution_id, question_id, seq, outcome, resolved_at,
                    recorded_at, source_confirmed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                  res_id_str,
                  q_id_str,
                  seq,
                  new.outcome,
                  resolved_at_str,
                  now_str,
                  new.source_confirmed,
                ],
              )?;
              Ok(RawResolution {
                resolution_id:    res_id_str.clone(),
                question_id:      q_id_str.clone(),
                outcome:          new.outcome,
                resolved_at:      resolved_at_str.clone(),
                recorded_at:      now_str.clone(),
                source_confirmed: new.source_confirmed,
              })
            };

            if question.state == open {
              let row = insert(1)?;
              tx.execute(
                "UPDATE questions SET state = ?2, state_changed_at = ?3
                 WHERE question_id = ?1 AND state = 'open'",
                rusqlite::params![q_id_str, resolved, now_str],
              )?;
              RawResolve::Resolved(row)
            } else if question.state == resolved {
              match select_active_resolution(&tx, &q_id_str)? {
                Some((_, active)) if active.outcome == new.outcome => RawResolve::Unchanged,
                Some((seq, _)) => RawResolve::Corrected(insert(seq + 1)?),
                None => RawResolve::Corrected(insert(1)?),
              }
            } else {
              RawResolve::Rejected(question.state)
            }
          }
          ResolutionEvent::Cancelled { reason } | ResolutionEvent::Invalid { reason } => {
            if question.state == open {
              tx.execute(
                "UPDATE questions SET state = ?2, state_changed_at = ?3, state_reason = ?4
                 WHERE question_id = ?1 AND state = 'open'",
                rusqlite::params![q_id_str, target_str, now_str, reason],
              )?;
              RawResolve::Closed
            } else if question.state == target_str {
              RawResolve::Unchanged
            } else {
              RawResolve::Rejected(question.state)
            }
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    let outcome = match raw {
      RawResolve::NotFound => return Err(Error::QuestionNotFound(question_id)),
      RawResolve::Resolved(r) => ResolveOutcome::Resolved(r.into_resolution()?),
      RawResolve::Corrected(r) => {
        let r = r.into_resolution()?;
        debug!(%question_id, outcome = r.outcome, "resolution corrected");
        ResolveOutcome::Corrected(r)
      }
      RawResolve::Closed => ResolveOutcome::Closed(target),
      RawResolve::Unchanged => ResolveOutcome::Unchanged,
      RawResolve::Rejected(state) => {
        ResolveOutcome::Rejected { current: decode_state(&state)? }
      }
    };
    Ok(outcome)
  }

  async fn resolutions_for(&self, question_id: Uuid) -> Result<Vec<Resolution>> {
    let id_str = encode_uuid(question_id);
    let raws: Vec<RawResolution> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RESOLUTION_COLUMNS} FROM resolutions r
           WHERE r.question_id = ?1 ORDER BY r.seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawResolution::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawResolution::into_resolution).collect()
  }

  async fn resolved_questions(&self) -> Result<Vec<ResolvedQuestion>> {
    let (views, resolutions): (Vec<RawQuestionView>, Vec<RawResolution>) = self
      .conn
      .call(|conn| {
        let views = select_views(conn, None)?;
        let mut stmt = conn.prepare(&format!(
          "SELECT {RESOLUTION_COLUMNS} FROM resolutions r
           ORDER BY r.question_id, r.seq"
        ))?;
        let resolutions = stmt
          .query_map([], RawResolution::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((views, resolutions))
      })
      .await?;

    let mut by_question: HashMap<Uuid, Vec<Resolution>> = HashMap::new();
    for raw in resolutions {
      let r = raw.into_resolution()?;
      by_question.entry(r.question_id).or_default().push(r);
    }

    let mut out = Vec::new();
    for raw in views {
      let view = raw.into_view()?;
      if let Some(resolutions) = by_question.remove(&view.question.question_id) {
        out.push(ResolvedQuestion { view, resolutions });
      }
    }
    Ok(out)
  }

  // ── Scores ────────────────────────────────────────────────────────────────

  async fn upsert_score(&self, record: ScoreRecord) -> Result<ScoreChange> {
    let new = RawScore::encode(&record);

    let change = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existing: Option<RawScore> = tx
          .query_row(
            &format!(
              "SELECT {SCORE_COLUMNS} FROM scores
               WHERE question_id = ?1 AND forecaster_id = ?2"
            ),
            rusqlite::params![new.question_id, new.forecaster_id],
            RawScore::from_row,
          )
          .optional()?;

        let change = match existing {
          Some(ref old) if *old == new => return Ok(ScoreChange::Unchanged),
          Some(_) => ScoreChange::Updated,
          None => ScoreChange::Inserted,
        };
        tx.execute(
          &format!(
            "INSERT INTO scores ({SCORE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (question_id, forecaster_id) DO UPDATE SET
               forecast_id    = excluded.forecast_id,
               forecast_as_of = excluded.forecast_as_of,
               probability    = excluded.probability,
               resolution_id  = excluded.resolution_id,
               outcome        = excluded.outcome,
               cutoff         = excluded.cutoff,
               brier          = excluded.brier,
               category       = excluded.category"
          ),
          rusqlite::params![
            new.question_id,
            new.forecaster_id,
            new.forecast_id,
            new.forecast_as_of,
            new.probability,
            new.resolution_id,
            new.outcome,
            new.cutoff,
            new.brier,
            new.category,
          ],
        )?;
        tx.commit()?;
        Ok(change)
      })
      .await?;
    Ok(change)
  }

  async fn prune_scores(&self, question_id: Uuid, keep: Vec<String>) -> Result<usize> {
    let id_str = encode_uuid(question_id);
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let present: Vec<String> = {
          let mut stmt =
            tx.prepare("SELECT forecaster_id FROM scores WHERE question_id = ?1")?;
          stmt
            .query_map(rusqlite::params![id_str], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut removed = 0;
        for forecaster in present.iter().filter(|f| !keep.contains(f)) {
          removed += tx.execute(
            "DELETE FROM scores WHERE question_id = ?1 AND forecaster_id = ?2",
            rusqlite::params![id_str, forecaster],
          )?;
        }
        tx.commit()?;
        Ok(removed)
      })
      .await?;
    Ok(removed)
  }

  async fn score_records<'a>(&'a self, filter: &'a ScoreFilter) -> Result<Vec<ScoreRecord>> {
    let forecaster = filter.forecaster_id.clone();
    let category   = filter.category.clone();
    let q_id_str   = filter.question_id.map(encode_uuid);
    let after_str  = filter.cutoff_after.map(encode_dt);
    let before_str = filter.cutoff_before.map(encode_dt);

    let raws: Vec<RawScore> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SCORE_COLUMNS} FROM scores
           WHERE (?1 IS NULL OR forecaster_id = ?1)
             AND (?2 IS NULL OR category = ?2)
             AND (?3 IS NULL OR question_id = ?3)
             AND (?4 IS NULL OR cutoff >= ?4)
             AND (?5 IS NULL OR cutoff < ?5)
           ORDER BY cutoff, question_id, forecaster_id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![forecaster, category, q_id_str, after_str, before_str],
            RawScore::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawScore::into_record).collect()
  }
}
