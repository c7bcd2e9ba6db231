//! Read-only aggregate views over score records. Lower mean Brier is better;
//! every board is ordered best-first.

use std::collections::BTreeMap;

use augur_core::score::ScoreRecord;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
  pub forecaster_id: String,
  pub category:      Option<String>,
  pub questions:     usize,
  pub mean_brier:    f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowBoard {
  pub days: u32,
  pub rows: Vec<LeaderboardRow>,
}

fn board<'a, K: Ord>(
  records: impl IntoIterator<Item = &'a ScoreRecord>,
  key: impl Fn(&'a ScoreRecord) -> K,
  row: impl Fn(K, usize, f64) -> LeaderboardRow,
) -> Vec<LeaderboardRow> {
  let mut sums: BTreeMap<K, (usize, f64)> = BTreeMap::new();
  for r in records {
    let entry = sums.entry(key(r)).or_default();
    entry.0 += 1;
    entry.1 += r.brier;
  }
  let mut rows: Vec<_> = sums
    .into_iter()
    .map(|(k, (n, sum))| row(k, n, sum / n as f64))
    .collect();
  rows.sort_by(|a, b| {
    a.mean_brier
      .total_cmp(&b.mean_brier)
      .then_with(|| a.forecaster_id.cmp(&b.forecaster_id))
      .then_with(|| a.category.cmp(&b.category))
  });
  rows
}

/// Mean Brier per forecaster over all records.
pub fn leaderboard(records: &[ScoreRecord]) -> Vec<LeaderboardRow> {
  board(records, |r| r.forecaster_id.as_str(), |id, questions, mean_brier| LeaderboardRow {
    forecaster_id: id.to_owned(),
    category: None,
    questions,
    mean_brier,
  })
}

/// Mean Brier per (forecaster, category). Uncategorised questions form their
/// own group.
pub fn by_category(records: &[ScoreRecord]) -> Vec<LeaderboardRow> {
  board(
    records,
    |r| (r.forecaster_id.as_str(), r.category.as_deref()),
    |(id, category), questions, mean_brier| LeaderboardRow {
      forecaster_id: id.to_owned(),
      category: category.map(str::to_owned),
      questions,
      mean_brier,
    },
  )
}

/// One leaderboard per trailing window, over records whose cutoff falls
/// within the last `days` days before `now`.
pub fn windowed(records: &[ScoreRecord], now: DateTime<Utc>, windows_days: &[u32]) -> Vec<WindowBoard> {
  windows_days
    .iter()
    .map(|&days| {
      let since = Duration::try_days(i64::from(days))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
      let recent: Vec<ScoreRecord> = records
        .iter()
        .filter(|r| r.cutoff >= since && r.cutoff <= now)
        .cloned()
        .collect();
      WindowBoard { days, rows: leaderboard(&recent) }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use uuid::Uuid;

  use super::*;

  fn record(forecaster: &str, category: Option<&str>, brier: f64, cutoff_days_ago: i64) -> ScoreRecord {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    ScoreRecord {
      question_id:    Uuid::new_v4(),
      forecaster_id:  forecaster.into(),
      forecast_id:    Uuid::new_v4(),
      forecast_as_of: now - Duration::days(cutoff_days_ago + 1),
      probability:    0.5,
      resolution_id:  Uuid::new_v4(),
      outcome:        1.0,
      cutoff:         now - Duration::days(cutoff_days_ago),
      brier,
      category:       category.map(Into::into),
    }
  }

  #[test]
  fn leaderboard_orders_best_first() {
    let records = [
      record("a", None, 0.30, 1),
      record("a", None, 0.10, 1),
      record("b", None, 0.05, 1),
    ];
    let rows = leaderboard(&records);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].forecaster_id, "b");
    assert_eq!(rows[1].questions, 2);
    assert!((rows[1].mean_brier - 0.20).abs() < 1e-12);
  }

  #[test]
  fn category_groups_are_separate() {
    let records = [
      record("a", Some("tech"), 0.1, 1),
      record("a", Some("politics"), 0.3, 1),
      record("a", None, 0.2, 1),
    ];
    let rows = by_category(&records);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].category.as_deref(), Some("tech"));
    assert_eq!(rows[1].category, None);
  }

  #[test]
  fn windows_only_see_recent_cutoffs() {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let records = [record("a", None, 0.1, 5), record("a", None, 0.5, 60)];
    let boards = windowed(&records, now, &[30, 90]);
    assert_eq!(boards[0].days, 30);
    assert_eq!(boards[0].rows[0].questions, 1);
    assert_eq!(boards[1].rows[0].questions, 2);
  }
}
