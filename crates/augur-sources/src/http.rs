//! HTTP plumbing shared by the venue adapters: client construction and the
//! mapping from transport failures to transient/permanent source errors.

use std::time::Duration;

use augur_core::source::SourceError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

pub fn client(timeout: Duration, bearer: Option<&str>) -> reqwest::Result<Client> {
  let mut headers = reqwest::header::HeaderMap::new();
  if let Some(token) = bearer
    && let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
  {
    headers.insert(reqwest::header::AUTHORIZATION, value);
  }
  Client::builder()
    .timeout(timeout)
    .user_agent(concat!("augur/", env!("CARGO_PKG_VERSION")))
    .default_headers(headers)
    .build()
}

/// Timeouts and connection failures are worth retrying next cycle; a request
/// we could not even build is not.
pub fn transport_error(e: reqwest::Error) -> SourceError {
  if e.is_timeout() || e.is_connect() || e.is_request() {
    SourceError::transient(e.to_string())
  } else {
    SourceError::permanent(e.to_string())
  }
}

/// 429 and 5xx are transient; every other non-success status is permanent.
pub fn status_error(what: &str, status: StatusCode) -> SourceError {
  let message = format!("{what} → {status}");
  if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
    SourceError::transient(message)
  } else {
    SourceError::permanent(message)
  }
}

pub async fn send(what: &str, req: RequestBuilder) -> Result<Response, SourceError> {
  req.send().await.map_err(|e| {
    let mut err = transport_error(e);
    err.message = format!("{what}: {}", err.message);
    err
  })
}

/// Send and decode a successful JSON body. `Ok(None)` on 404.
pub async fn get_json<T: DeserializeOwned>(
  what: &str,
  req: RequestBuilder,
) -> Result<Option<T>, SourceError> {
  let resp = send(what, req).await?;
  let status = resp.status();
  if status == StatusCode::NOT_FOUND {
    return Ok(None);
  }
  if !status.is_success() {
    return Err(status_error(what, status));
  }
  resp
    .json()
    .await
    .map(Some)
    .map_err(|e| SourceError::permanent(format!("{what}: undecodable body: {e}")))
}
