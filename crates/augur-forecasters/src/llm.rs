//! A forecaster backed by any OpenAI-compatible `POST /chat/completions`
//! endpoint.

use std::time::Duration;

use async_trait::async_trait;
use augur_core::forecaster::{ForecastError, ForecastRequest, Forecaster, Generation};
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROMPT: &str = "\
You are an expert superforecaster, familiar with the work of Tetlock and others. \
Make a prediction of the probability that the question will be resolved as true. \
You MUST give a probability estimate between 0 and 1 UNDER ALL CIRCUMSTANCES. \
If for some reason you can't answer, pick the base rate, but return a number between 0 and 1.

Question:
{question}

Question Background:
{background}

Today's Date: {today}

Resolution Date: {resolution_date}

Respond with a single JSON object of the form \
{\"probability\": <number between 0 and 1>, \"reasoning\": \"<brief reasoning>\"}.";

pub fn build_prompt(request: &ForecastRequest) -> String {
  let background = request
    .background
    .as_deref()
    .filter(|b| !b.trim().is_empty())
    .unwrap_or("No additional background provided.");
  let resolution_date = request
    .resolution_date
    .map(|d| d.to_string())
    .unwrap_or_else(|| "Not specified".to_owned());
  PROMPT
    .replace("{question}", &request.question_text)
    .replace("{background}", background)
    .replace("{today}", &request.today.to_string())
    .replace("{resolution_date}", &resolution_date)
}

// ─── Wire types ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
  model:           &'a str,
  messages:        [ChatMessage<'a>; 1],
  temperature:     f32,
  response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role:    &'static str,
  content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")]
  kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
  content: Option<String>,
}

// ─── Output parsing ─────────────────────────────────────────────────────────

/// Pull `{probability, reasoning}` out of a model reply. Accepts a bare JSON
/// object or one embedded in surrounding prose or a code fence.
pub fn parse_output(content: &str) -> Result<(f64, Option<String>), ForecastError> {
  let object = serde_json::from_str::<Value>(content.trim())
    .ok()
    .filter(Value::is_object)
    .or_else(|| {
      let start = content.find('{')?;
      let end = content.rfind('}')?;
      serde_json::from_str(content.get(start..=end)?).ok()
    })
    .ok_or_else(|| ForecastError::InvalidOutput("no JSON object in reply".into()))?;

  let probability = match object.get("probability") {
    Some(Value::Number(n)) => n.as_f64(),
    Some(Value::String(s)) => s.trim().parse().ok(),
    _ => None,
  }
  .ok_or_else(|| ForecastError::InvalidOutput("missing numeric `probability`".into()))?;

  let reasoning = object
    .get("reasoning")
    .and_then(Value::as_str)
    .map(str::to_owned);
  Ok((probability, reasoning))
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
  resp
    .headers()
    .get(RETRY_AFTER)?
    .to_str()
    .ok()?
    .trim()
    .parse::<f64>()
    .ok()
    .filter(|s| s.is_finite() && *s >= 0.0)
    .map(Duration::from_secs_f64)
}

fn status_error(status: StatusCode, hint: Option<Duration>) -> ForecastError {
  match status {
    StatusCode::TOO_MANY_REQUESTS => ForecastError::RateLimited { retry_after: hint },
    StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ForecastError::Timeout,
    s if s.is_server_error() || s == StatusCode::UNAUTHORIZED || s == StatusCode::FORBIDDEN => {
      ForecastError::ProviderUnavailable(format!("HTTP {s}"))
    }
    s => ForecastError::InvalidOutput(format!("HTTP {s}")),
  }
}

fn transport_error(e: reqwest::Error) -> ForecastError {
  if e.is_timeout() {
    ForecastError::Timeout
  } else {
    ForecastError::ProviderUnavailable(e.to_string())
  }
}

// ─── Forecaster ─────────────────────────────────────────────────────────────

pub struct LlmForecaster {
  id:          String,
  provider:    String,
  model:       String,
  endpoint:    String,
  api_key:     Option<String>,
  temperature: f32,
  client:      Client,
}

impl LlmForecaster {
  pub fn new(
    id: impl Into<String>,
    provider: impl Into<String>,
    model: impl Into<String>,
    base_url: Option<&str>,
    api_key: Option<String>,
    temperature: f32,
  ) -> reqwest::Result<Self> {
    let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
    Ok(Self {
      id: id.into(),
      provider: provider.into(),
      model: model.into(),
      endpoint: format!("{base}/chat/completions"),
      api_key,
      temperature,
      client: Client::builder()
        .user_agent(concat!("augur/", env!("CARGO_PKG_VERSION")))
        .build()?,
    })
  }
}

#[async_trait]
impl Forecaster for LlmForecaster {
  fn id(&self) -> &str { &self.id }

  fn provider(&self) -> &str { &self.provider }

  fn model(&self) -> &str { &self.model }

  async fn generate(
    &self,
    request: &ForecastRequest,
  ) -> Result<Generation, ForecastError> {
    let prompt = build_prompt(request);
    let body = ChatRequest {
      model:           &request.model,
      messages:        [ChatMessage { role: "user", content: &prompt }],
      temperature:     self.temperature,
      response_format: ResponseFormat { kind: "json_object" },
    };

    let mut req = self
      .client
      .post(&self.endpoint)
      .timeout(request.timeout)
      .json(&body);
    if let Some(key) = &self.api_key {
      req = req.bearer_auth(key);
    }

    let resp = req.send().await.map_err(transport_error)?;
    let status = resp.status();
    if !status.is_success() {
      return Err(status_error(status, retry_after(&resp)));
    }

    let chat: ChatResponse = resp.json().await.map_err(|e| {
      if e.is_timeout() {
        ForecastError::Timeout
      } else {
        ForecastError::InvalidOutput(format!("undecodable response: {e}"))
      }
    })?;
    let content = chat
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .ok_or_else(|| ForecastError::InvalidOutput("empty completion".into()))?;

    let (probability, reasoning) = parse_output(&content)?;
    debug!(forecaster = %self.id, question_id = %request.question_id, probability, "completion parsed");
    Ok(Generation { probability, raw_output: content, reasoning })
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use uuid::Uuid;

  use super::*;

  fn request() -> ForecastRequest {
    ForecastRequest {
      question_id:     Uuid::nil(),
      question_text:   "Will X happen?".into(),
      background:      None,
      resolution_date: None,
      today:           NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
      base_rate:       Some(0.4),
      model:           "gpt-4o-mini".into(),
      timeout:         Duration::from_secs(5),
    }
  }

  #[test]
  fn prompt_fills_defaults() {
    let prompt = build_prompt(&request());
    assert!(prompt.contains("Question:\nWill X happen?"));
    assert!(prompt.contains("No additional background provided."));
    assert!(prompt.contains("Today's Date: 2025-03-14"));
    assert!(prompt.contains("Resolution Date: Not specified"));
  }

  #[test]
  fn prompt_uses_question_fields() {
    let mut r = request();
    r.background = Some("Context here.".into());
    r.resolution_date = NaiveDate::from_ymd_opt(2025, 12, 31);
    let prompt = build_prompt(&r);
    assert!(prompt.contains("Context here."));
    assert!(prompt.contains("Resolution Date: 2025-12-31"));
  }

  #[test]
  fn parses_bare_and_embedded_json() {
    let (p, why) = parse_output(r#"{"probability": 0.7, "reasoning": "trend"}"#).unwrap();
    assert_eq!(p, 0.7);
    assert_eq!(why.as_deref(), Some("trend"));

    let fenced = "Sure.\n```json\n{\"probability\": \"0.25\"}\n```";
    let (p, why) = parse_output(fenced).unwrap();
    assert_eq!(p, 0.25);
    assert!(why.is_none());
  }

  #[test]
  fn rejects_unparseable_output() {
    assert!(matches!(parse_output("about seventy percent"), Err(ForecastError::InvalidOutput(_))));
    assert!(matches!(
      parse_output(r#"{"reasoning": "no number"}"#),
      Err(ForecastError::InvalidOutput(_))
    ));
  }

  #[test]
  fn out_of_range_is_left_to_the_scheduler() {
    let (p, _) = parse_output(r#"{"probability": 1.3}"#).unwrap();
    assert_eq!(p, 1.3);
  }

  #[test]
  fn status_mapping() {
    let hint = Some(Duration::from_secs(2));
    assert!(matches!(
      status_error(StatusCode::TOO_MANY_REQUESTS, hint),
      ForecastError::RateLimited { retry_after } if retry_after == hint
    ));
    assert!(matches!(status_error(StatusCode::BAD_GATEWAY, None), ForecastError::ProviderUnavailable(_)));
    assert!(matches!(status_error(StatusCode::UNAUTHORIZED, None), ForecastError::ProviderUnavailable(_)));
    assert!(matches!(status_error(StatusCode::GATEWAY_TIMEOUT, None), ForecastError::Timeout));
    assert!(matches!(status_error(StatusCode::BAD_REQUEST, None), ForecastError::InvalidOutput(_)));
  }

  #[tokio::test]
  async fn unreachable_endpoint_is_provider_unavailable() {
    let f = LlmForecaster::new("m", "local", "m", Some("http://127.0.0.1:9"), None, 0.0).unwrap();
    let err = f.generate(&request()).await.unwrap_err();
    assert!(err.is_retryable());
  }
}
