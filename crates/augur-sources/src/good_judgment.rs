//! Good Judgment Open adapter.
//!
//! The API is loosely specified and field names vary between endpoints, so
//! records are read from raw JSON with fallbacks rather than a fixed schema.

use std::time::Duration;

use async_trait::async_trait;
use augur_core::source::{RawQuestion, ResolutionStatus, SourceAdapter, SourceError};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://www.gjopen.com/api/v1";

/// First present, non-null field among `keys`.
fn field<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
  keys.iter().filter_map(|k| v.get(*k)).find(|x| !x.is_null())
}

fn string(v: &Value, keys: &[&str]) -> Option<String> {
  field(v, keys).and_then(|x| match x {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  })
}

fn number(v: &Value, keys: &[&str]) -> Option<f64> {
  field(v, keys).and_then(|x| match x {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  })
}

fn timestamp(v: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
  let s = string(v, keys)?;
  DateTime::parse_from_rfc3339(&s)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
}

fn date(v: &Value, keys: &[&str]) -> Option<NaiveDate> {
  timestamp(v, keys).map(|dt| dt.date_naive()).or_else(|| {
    let s = string(v, keys)?;
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
  })
}

fn parse_question(v: &Value) -> Result<RawQuestion, String> {
  let id = string(v, &["id"]).ok_or("missing id")?;
  let text = string(v, &["title", "question"]).ok_or_else(|| format!("question {id}: missing title"))?;
  Ok(RawQuestion {
    url: string(v, &["url"]).or_else(|| Some(format!("https://www.gjopen.com/questions/{id}"))),
    text,
    background: string(v, &["description", "background"]),
    category: string(v, &["category", "topic"]),
    open_date: timestamp(v, &["created_at", "publish_time"]),
    resolution_date: date(v, &["close_time", "resolution_date"]),
    base_rate: number(v, &["crowd_forecast", "community_prediction"]),
    source_question_id: id,
  })
}

fn resolution_status(v: &Value) -> Result<ResolutionStatus, SourceError> {
  let status = string(v, &["status"]).unwrap_or_default().to_lowercase();
  match status.as_str() {
    "resolved" | "closed" => {
      let outcome = match field(v, &["resolution"]) {
        Some(Value::String(s)) if s.eq_ignore_ascii_case("yes") => Some(1.0),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("no") => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
      };
      match outcome {
        Some(outcome) => Ok(ResolutionStatus::Resolved {
          outcome,
          resolved_at: timestamp(v, &["resolved_at", "resolution_time"]),
          confirmed: status == "resolved",
        }),
        // Closed for forecasting but not yet graded.
        None if status == "closed" => Ok(ResolutionStatus::StillOpen),
        None => Err(SourceError::permanent("resolved question without a usable resolution")),
      }
    }
    "voided" | "cancelled" | "canceled" | "annulled" => Ok(ResolutionStatus::Cancelled {
      reason: string(v, &["resolution_notes", "status_reason"]).or(Some(status)),
    }),
    _ => Ok(ResolutionStatus::StillOpen),
  }
}

pub struct GoodJudgmentSource {
  name:      String,
  client:    Client,
  base_url:  String,
  page_size: usize,
  max_pages: usize,
}

impl GoodJudgmentSource {
  pub fn new(
    name: impl Into<String>,
    base_url: Option<String>,
    api_key: Option<&str>,
    page_size: usize,
    max_pages: usize,
    timeout: Duration,
  ) -> reqwest::Result<Self> {
    Ok(Self {
      name:      name.into(),
      client:    http::client(timeout, api_key)?,
      base_url:  base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
      page_size: page_size.max(1),
      max_pages: max_pages.max(1),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }
}

#[async_trait]
impl SourceAdapter for GoodJudgmentSource {
  fn name(&self) -> &str { &self.name }

  async fn fetch_questions(&self) -> Result<Vec<RawQuestion>, SourceError> {
    let mut out = Vec::new();

    for page in 1..=self.max_pages {
      let req = self.client.get(self.url("/questions")).query(&[
        ("page", page.to_string()),
        ("per_page", self.page_size.to_string()),
        ("status", "open".to_owned()),
      ]);
      let body: Value = http::get_json("GET /questions", req)
        .await?
        .ok_or_else(|| SourceError::permanent("GET /questions → 404"))?;

      let items = field(&body, &["questions", "data"])
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
      if items.is_empty() {
        break;
      }
      for item in &items {
        match parse_question(item) {
          Ok(q) => out.push(q),
          Err(e) => warn!(source = %self.name, error = %e, "skipping unparseable question"),
        }
      }

      let total_pages = number(&body, &["total_pages", "pages"]).unwrap_or(1.0) as usize;
      debug!(source = %self.name, page, total_pages, fetched = out.len(), "fetched questions page");
      if page >= total_pages {
        break;
      }
    }
    Ok(out)
  }

  async fn fetch_resolution(
    &self,
    source_question_id: &str,
  ) -> Result<ResolutionStatus, SourceError> {
    let req = self.client.get(self.url(&format!("/questions/{source_question_id}")));
    match http::get_json::<Value>("GET /questions/{id}", req).await? {
      Some(body) => resolution_status(&body),
      None => Ok(ResolutionStatus::NotFound),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn parses_question_with_fallback_fields() {
    let q = parse_question(&json!({
      "id": 3412,
      "question": "Will the ECB cut rates before July?",
      "background": "Rates held since 2023.",
      "topic": "Economics",
      "resolution_date": "2025-06-30",
      "community_prediction": "0.35",
      "created_at": "2025-01-02T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(q.source_question_id, "3412");
    assert_eq!(q.text, "Will the ECB cut rates before July?");
    assert_eq!(q.category.as_deref(), Some("Economics"));
    assert_eq!(q.resolution_date, NaiveDate::from_ymd_opt(2025, 6, 30));
    assert_eq!(q.base_rate, Some(0.35));
    assert_eq!(q.url.as_deref(), Some("https://www.gjopen.com/questions/3412"));
    assert!(q.open_date.is_some());
  }

  #[test]
  fn question_without_text_is_an_error() {
    assert!(parse_question(&json!({"id": "1"})).is_err());
  }

  #[test]
  fn resolution_statuses() {
    let yes = resolution_status(&json!({"status": "resolved", "resolution": "Yes"})).unwrap();
    assert!(matches!(yes, ResolutionStatus::Resolved { outcome, confirmed: true, .. } if outcome == 1.0));

    let graded = resolution_status(&json!({"status": "resolved", "resolution": 0.25})).unwrap();
    assert!(matches!(graded, ResolutionStatus::Resolved { outcome, .. } if outcome == 0.25));

    let closed = resolution_status(&json!({"status": "closed"})).unwrap();
    assert_eq!(closed, ResolutionStatus::StillOpen);

    let voided = resolution_status(&json!({"status": "voided"})).unwrap();
    assert!(matches!(voided, ResolutionStatus::Cancelled { .. }));

    let active = resolution_status(&json!({"status": "active"})).unwrap();
    assert_eq!(active, ResolutionStatus::StillOpen);
  }
}
