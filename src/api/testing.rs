//! Scripted in-memory gateway for tests.

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::api_types::ApiResponse;
use super::gateway::{ApiRequest, FetchGateway, Method};
use super::session::Session;
use crate::error::PmError;

struct Reply {
  result: Result<ApiResponse<Value>, PmError>,
  gate: Option<oneshot::Receiver<()>>,
}

/// Gateway answering from per-route FIFO queues of canned replies.
#[derive(Default)]
pub struct FakeGateway {
  replies: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
  requests: Mutex<Vec<ApiRequest>>,
}

impl FakeGateway {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reply(&self, method: Method, path: &str, result: Result<ApiResponse<Value>, PmError>) {
    self.push(method, path, Reply { result, gate: None });
  }

  /// Queue a reply that is held back until the returned sender fires.
  pub fn reply_gated(
    &self,
    method: Method,
    path: &str,
    result: Result<ApiResponse<Value>, PmError>,
  ) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    self.push(
      method,
      path,
      Reply {
        result,
        gate: Some(rx),
      },
    );
    tx
  }

  pub fn requests(&self) -> Vec<ApiRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn count(&self, method: Method, path: &str) -> usize {
    self
      .requests()
      .iter()
      .filter(|r| r.method == method && r.path == path)
      .count()
  }

  fn push(&self, method: Method, path: &str, reply: Reply) {
    self
      .replies
      .lock()
      .unwrap()
      .entry((method, path.to_string()))
      .or_default()
      .push_back(reply);
  }
}

impl FetchGateway for FakeGateway {
  async fn send(
    &self,
    session: &Session,
    request: ApiRequest,
  ) -> Result<ApiResponse<Value>, PmError> {
    session.bearer()?;

    let reply = {
      self.requests.lock().unwrap().push(request.clone());
      self
        .replies
        .lock()
        .unwrap()
        .get_mut(&(request.method, request.path.clone()))
        .and_then(VecDeque::pop_front)
    };

    let Some(reply) = reply else {
      return Err(PmError::network(format!(
        "no scripted reply for {} {}",
        request.method.as_str(),
        request.path
      )));
    };

    if let Some(gate) = reply.gate {
      let _ = gate.await;
    }
    reply.result
  }
}

/// Envelope holding the given results.
pub fn envelope(results: Vec<Value>) -> ApiResponse<Value> {
  ApiResponse {
    limit: None,
    offset: None,
    total_results: Some(results.len() as u64),
    results,
    has_errors: false,
    errors: Vec::new(),
  }
}

pub fn ok(results: Vec<Value>) -> Result<ApiResponse<Value>, PmError> {
  Ok(envelope(results))
}

pub fn log_json(id: &str, event_id: &str, duration: f64) -> Value {
  json!({ "id": id, "eventId": event_id, "title": format!("log {}", id), "duration": duration })
}

pub fn event_json(id: &str, title: &str, day: &str, logs: Vec<Value>) -> Value {
  json!({ "id": id, "title": title, "day": day, "logs": logs })
}

pub fn day_json(id: &str, date: &str, events: Vec<Value>) -> Value {
  json!({ "id": id, "workingDate": date, "startOfWork": 9.0, "events": events })
}

pub fn task_json(id: &str, title: &str, status: &str) -> Value {
  json!({ "id": id, "projectId": "P1", "title": title, "status": status, "dueDate": "2024-04-01" })
}
