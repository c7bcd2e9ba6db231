//! SQL schema for the Augur SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Identity plus lifecycle state. The only UPDATE ever issued here is the
-- open -> terminal state transition.
CREATE TABLE IF NOT EXISTS questions (
    question_id         TEXT PRIMARY KEY,   -- UUIDv5 of (source, source_question_id)
    source              TEXT NOT NULL,
    source_question_id  TEXT NOT NULL,
    state               TEXT NOT NULL DEFAULT 'open',
    first_seen_at       TEXT NOT NULL,
    state_changed_at    TEXT,
    state_reason        TEXT,
    UNIQUE (source, source_question_id)
);

-- Append-only; a row is written only when content_hash differs from the
-- previous row for the same question.
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id   TEXT PRIMARY KEY,
    question_id   TEXT NOT NULL REFERENCES questions(question_id),
    seq           INTEGER NOT NULL,   -- 1-based, per question
    captured_at   TEXT NOT NULL,
    content_hash  TEXT NOT NULL,
    content_json  TEXT NOT NULL,
    UNIQUE (question_id, seq)
);

-- Append-only. Never updated or deleted.
CREATE TABLE IF NOT EXISTS forecasts (
    forecast_id    TEXT PRIMARY KEY,
    question_id    TEXT NOT NULL REFERENCES questions(question_id),
    forecaster_id  TEXT NOT NULL,
    as_of          TEXT NOT NULL,
    probability    REAL NOT NULL CHECK (probability >= 0.0 AND probability <= 1.0),
    raw_output     TEXT NOT NULL,
    reasoning      TEXT,
    latency_ms     INTEGER NOT NULL,
    retry_count    INTEGER NOT NULL,
    clamped        INTEGER NOT NULL DEFAULT 0,
    UNIQUE (question_id, forecaster_id, as_of)
);

-- Forecast requests that exhausted their attempts.
CREATE TABLE IF NOT EXISTS forecast_failures (
    failure_id     TEXT PRIMARY KEY,
    question_id    TEXT NOT NULL REFERENCES questions(question_id),
    forecaster_id  TEXT NOT NULL,
    kind           TEXT NOT NULL,
    message        TEXT NOT NULL,
    attempts       INTEGER NOT NULL,
    failed_at      TEXT NOT NULL
);

-- Append-only; the highest seq is the active resolution.
CREATE TABLE IF NOT EXISTS resolutions (
    resolution_id     TEXT PRIMARY KEY,
    question_id       TEXT NOT NULL REFERENCES questions(question_id),
    seq               INTEGER NOT NULL,
    outcome           REAL NOT NULL CHECK (outcome >= 0.0 AND outcome <= 1.0),
    resolved_at       TEXT NOT NULL,
    recorded_at       TEXT NOT NULL,
    source_confirmed  INTEGER NOT NULL,
    UNIQUE (question_id, seq)
);

-- Derived; overwritten on every scoring pass.
CREATE TABLE IF NOT EXISTS scores (
    question_id     TEXT NOT NULL REFERENCES questions(question_id),
    forecaster_id   TEXT NOT NULL,
    forecast_id     TEXT NOT NULL REFERENCES forecasts(forecast_id),
    forecast_as_of  TEXT NOT NULL,
    probability     REAL NOT NULL,
    resolution_id   TEXT NOT NULL REFERENCES resolutions(resolution_id),
    outcome         REAL NOT NULL,
    cutoff          TEXT NOT NULL,
    brier           REAL NOT NULL,
    category        TEXT,
    PRIMARY KEY (question_id, forecaster_id),
    CHECK (forecast_as_of <= cutoff)
);

CREATE INDEX IF NOT EXISTS questions_state_idx      ON questions(state);
CREATE INDEX IF NOT EXISTS snapshots_question_idx   ON snapshots(question_id, seq);
CREATE INDEX IF NOT EXISTS forecasts_pair_idx       ON forecasts(question_id, forecaster_id, as_of);
CREATE INDEX IF NOT EXISTS failures_question_idx    ON forecast_failures(question_id);
CREATE INDEX IF NOT EXISTS resolutions_question_idx ON resolutions(question_id, seq);
CREATE INDEX IF NOT EXISTS scores_forecaster_idx    ON scores(forecaster_id);

PRAGMA user_version = 1;
";
