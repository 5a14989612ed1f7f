//! Serde types matching the backend's response envelope.
//!
//! Every endpoint, read or write, answers with the same envelope. Results are
//! kept as raw JSON by the gateway and decoded into domain types by whoever
//! knows what the request was for.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::PmError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorItem {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub code: Option<String>,
}

/// Paginated response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
  #[serde(default)]
  pub limit: Option<u64>,
  #[serde(default)]
  pub offset: Option<u64>,
  #[serde(default)]
  pub total_results: Option<u64>,
  #[serde(default = "Vec::new", alias = "data")]
  pub results: Vec<T>,
  #[serde(default)]
  pub has_errors: bool,
  #[serde(default)]
  pub errors: Vec<ApiErrorItem>,
}

impl<T> Default for ApiResponse<T> {
  fn default() -> Self {
    Self {
      limit: None,
      offset: None,
      total_results: None,
      results: Vec::new(),
      has_errors: false,
      errors: Vec::new(),
    }
  }
}

impl ApiResponse<Value> {
  /// Turn an envelope flagged with `hasErrors` into a network error.
  pub fn into_checked(self) -> Result<Self, PmError> {
    if self.has_errors {
      let message = self
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .find(|m| !m.trim().is_empty())
        .unwrap_or("Request failed")
        .to_string();
      return Err(PmError::network(message));
    }
    Ok(self)
  }

  /// Decode all results into `T`.
  pub fn decode<T: DeserializeOwned>(self) -> Result<ApiResponse<T>, PmError> {
    let results = self
      .results
      .into_iter()
      .map(serde_json::from_value)
      .collect::<Result<Vec<T>, _>>()
      .map_err(|e| PmError::network(format!("Failed to parse response: {}", e)))?;

    Ok(ApiResponse {
      limit: self.limit,
      offset: self.offset,
      total_results: self.total_results,
      results,
      has_errors: self.has_errors,
      errors: self.errors,
    })
  }

  /// Decode the first result, the affected entity of a write.
  pub fn decode_first<T: DeserializeOwned>(self) -> Result<T, PmError> {
    let first = self
      .results
      .into_iter()
      .next()
      .ok_or_else(|| PmError::network("Response contained no results"))?;
    serde_json::from_value(first)
      .map_err(|e| PmError::network(format!("Failed to parse response: {}", e)))
  }
}

/// Error body sent with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub errors: Vec<ApiErrorItem>,
}

impl ApiErrorBody {
  pub fn message(self) -> Option<String> {
    self
      .message
      .filter(|m| !m.trim().is_empty())
      .or_else(|| self.errors.into_iter().map(|e| e.message).find(|m| !m.trim().is_empty()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Task;
  use serde_json::json;

  #[test]
  fn test_envelope_accepts_legacy_data_field() {
    let response: ApiResponse<Value> = serde_json::from_value(json!({
      "hasErrors": false,
      "data": [{ "id": "T1", "title": "Write docs", "status": "done" }]
    }))
    .unwrap();

    let tasks = response.decode::<Task>().unwrap();
    assert_eq!(tasks.results.len(), 1);
    assert_eq!(tasks.results[0].title, "Write docs");
  }

  #[test]
  fn test_has_errors_becomes_network_error() {
    let response: ApiResponse<Value> = serde_json::from_value(json!({
      "hasErrors": true,
      "errors": [{ "message": "" }, { "message": "Title taken" }],
      "results": []
    }))
    .unwrap();

    let err = response.into_checked().unwrap_err();
    assert_eq!(err, PmError::network("Title taken"));
  }

  #[test]
  fn test_decode_first_requires_a_result() {
    let response: ApiResponse<Value> = ApiResponse::default();
    assert!(response.decode_first::<Task>().unwrap_err().is_network());
  }
}
