use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::api::api_types::{ApiErrorBody, ApiResponse};
use crate::api::gateway::{ApiRequest, FetchGateway, Method};
use crate::api::session::Session;
use crate::config::ApiConfig;
use crate::error::PmError;

/// reqwest-backed gateway to the tracking backend
#[derive(Clone)]
pub struct HttpGateway {
  client: reqwest::Client,
  base_url: String,
}

impl HttpGateway {
  pub fn new(config: &ApiConfig) -> Result<Self, PmError> {
    Url::parse(&config.url)
      .map_err(|e| PmError::precondition(format!("Invalid API url {}: {}", config.url, e)))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| PmError::network(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self {
      client,
      base_url: config.url.trim_end_matches('/').to_string(),
    })
  }

  fn url(&self, request: &ApiRequest) -> Result<Url, PmError> {
    let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
      .map_err(|e| PmError::precondition(format!("Invalid request path {}: {}", request.path, e)))?;
    if !request.query.is_empty() {
      url.query_pairs_mut().extend_pairs(request.query.iter());
    }
    Ok(url)
  }
}

impl FetchGateway for HttpGateway {
  async fn send(
    &self,
    session: &Session,
    request: ApiRequest,
  ) -> Result<ApiResponse<Value>, PmError> {
    let token = session.bearer()?;
    let url = self.url(&request)?;

    tracing::debug!(method = request.method.as_str(), %url, "sending request");

    let builder = match request.method {
      Method::Get => self.client.get(url),
      Method::Post => self.client.post(url),
      Method::Patch => self.client.patch(url),
      Method::Delete => self.client.delete(url),
    };
    let builder = builder.bearer_auth(token);
    let builder = match &request.body {
      Some(body) => builder.json(body),
      None => builder,
    };

    let response = builder
      .send()
      .await
      .map_err(|e| PmError::network(format!("Request failed: {}", e)))?;

    parse_response(response).await
  }
}

async fn parse_response(response: reqwest::Response) -> Result<ApiResponse<Value>, PmError> {
  let status = response.status();
  if !status.is_success() {
    let message = response
      .json::<ApiErrorBody>()
      .await
      .ok()
      .and_then(ApiErrorBody::message);
    tracing::debug!(status = status.as_u16(), ?message, "request rejected");
    return Err(PmError::http(status.as_u16(), message));
  }

  // DELETE endpoints may answer with an empty body
  if status == StatusCode::NO_CONTENT {
    return Ok(ApiResponse::default());
  }

  let bytes = response
    .bytes()
    .await
    .map_err(|e| PmError::network(format!("Failed to read response: {}", e)))?;
  if bytes.iter().all(u8::is_ascii_whitespace) {
    return Ok(ApiResponse::default());
  }

  let envelope: ApiResponse<Value> = serde_json::from_slice(&bytes)
    .map_err(|e| PmError::network(format!("Failed to parse response: {}", e)))?;
  envelope.into_checked()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gateway() -> HttpGateway {
    HttpGateway::new(&ApiConfig {
      url: "https://pm.example.com/api/".to_string(),
      ..ApiConfig::default()
    })
    .unwrap()
  }

  #[test]
  fn test_url_keeps_base_path_and_encodes_query() {
    let request = ApiRequest::get("/tasks").with_query(vec![
      ("status".to_string(), "in-progress".to_string()),
      ("search".to_string(), "fix bug".to_string()),
    ]);
    let url = gateway().url(&request).unwrap();
    assert_eq!(
      url.as_str(),
      "https://pm.example.com/api/tasks?status=in-progress&search=fix+bug"
    );
  }

  #[test]
  fn test_invalid_base_url_rejected() {
    let result = HttpGateway::new(&ApiConfig {
      url: "not a url".to_string(),
      ..ApiConfig::default()
    });
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_missing_credential_never_hits_network() {
    let err = gateway()
      .send(&Session::anonymous(), ApiRequest::get("/events"))
      .await
      .unwrap_err();
    assert!(err.is_precondition());
  }
}
