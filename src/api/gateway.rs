//! The network seam: one trait for sending a request and getting an envelope.

use serde::Deserialize;
use serde_json::Value;
use std::future::Future;

use super::api_types::ApiResponse;
use super::session::Session;
use crate::cache::QueryKey;
use crate::error::PmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

/// A backend request, independent of any HTTP library.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Path relative to the API root, e.g. `/events/42`
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      path: path.into(),
      query: Vec::new(),
      body: None,
    }
  }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self {
      method: Method::Post,
      path: path.into(),
      query: Vec::new(),
      body: Some(body),
    }
  }

  pub fn patch(path: impl Into<String>, body: Value) -> Self {
    Self {
      method: Method::Patch,
      path: path.into(),
      query: Vec::new(),
      body: Some(body),
    }
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self {
      method: Method::Delete,
      path: path.into(),
      query: Vec::new(),
      body: None,
    }
  }

  pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
    self.query = query;
    self
  }
}

/// Performs authenticated requests against the backend.
///
/// Implementations must check the session before doing any I/O so a missing
/// credential surfaces as a precondition error, not a network error.
pub trait FetchGateway: Send + Sync + 'static {
  fn send(
    &self,
    session: &Session,
    request: ApiRequest,
  ) -> impl Future<Output = Result<ApiResponse<Value>, PmError>> + Send;
}

/// Collection paths on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Routes {
  pub days: String,
  pub events: String,
  pub logs: String,
  pub tasks: String,
  pub task_search: String,
  pub projects: String,
  pub stats: String,
}

impl Default for Routes {
  fn default() -> Self {
    Self {
      days: "/days".to_string(),
      events: "/events".to_string(),
      logs: "/logs".to_string(),
      tasks: "/tasks".to_string(),
      task_search: "/tasks/search".to_string(),
      projects: "/projects".to_string(),
      stats: "/stats".to_string(),
    }
  }
}

impl Routes {
  /// The read request a query key stands for.
  pub fn read_request(&self, key: &QueryKey) -> ApiRequest {
    let path = match key {
      QueryKey::DayRange { .. } | QueryKey::Day { .. } => self.days.clone(),
      QueryKey::Stats { .. } => self.stats.clone(),
      QueryKey::Events { .. } => self.events.clone(),
      QueryKey::Tasks(_) => self.tasks.clone(),
      QueryKey::Task { id } => member(&self.tasks, id),
      QueryKey::TaskSearch { .. } => self.task_search.clone(),
      QueryKey::Projects => self.projects.clone(),
      QueryKey::Project { id } => member(&self.projects, id),
    };
    ApiRequest::get(path).with_query(key.query_pairs())
  }

  pub fn collection(&self, entity: Entity) -> &str {
    match entity {
      Entity::Project => &self.projects,
      Entity::Task => &self.tasks,
      Entity::Event => &self.events,
      Entity::Log => &self.logs,
    }
  }

  pub fn member(&self, entity: Entity, id: &str) -> String {
    member(self.collection(entity), id)
  }
}

/// Entity kinds that have write endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
  Project,
  Task,
  Event,
  Log,
}

fn member(collection: &str, id: &str) -> String {
  format!("{}/{}", collection.trim_end_matches('/'), id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::TaskFilter;
  use chrono::NaiveDate;
  use std::collections::HashMap;

  #[test]
  fn test_method_and_path_index_replies() {
    let mut replies: HashMap<(Method, String), u32> = HashMap::new();
    *replies.entry((Method::Get, "/days".to_string())).or_default() += 1;
    *replies.entry((Method::Get, "/days".to_string())).or_default() += 1;
    *replies.entry((Method::Delete, "/days".to_string())).or_default() += 1;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[&(Method::Get, "/days".to_string())], 2);
  }

  #[test]
  fn test_read_request_for_stats() {
    let key = QueryKey::stats(NaiveDate::from_ymd_opt(2024, 3, 1), None);
    let request = Routes::default().read_request(&key);
    assert_eq!(request.path, "/stats");
    assert_eq!(
      request.query,
      vec![("start".to_string(), "2024-03-01".to_string())]
    );
  }

  #[test]
  fn test_search_is_sent_as_typed() {
    let request = Routes::default().read_request(&QueryKey::task_search("Login Bug"));
    assert_eq!(request.path, "/tasks/search");
    assert_eq!(
      request.query,
      vec![("q".to_string(), "Login Bug".to_string())]
    );
  }

  #[test]
  fn test_read_request_for_flat_events() {
    let key = QueryKey::Events {
      day: NaiveDate::from_ymd_opt(2024, 3, 1),
      task_id: Some("T1".to_string()),
    };
    let request = Routes::default().read_request(&key);
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.path, "/events");
    assert_eq!(
      request.query,
      vec![
        ("day".to_string(), "2024-03-01".to_string()),
        ("taskId".to_string(), "T1".to_string()),
      ]
    );
  }

  #[test]
  fn test_read_request_for_detail() {
    let routes = Routes {
      tasks: "/api/tasks/".to_string(),
      ..Routes::default()
    };
    let request = routes.read_request(&QueryKey::Task {
      id: "T9".to_string(),
    });
    assert_eq!(request.path, "/api/tasks/T9");
    assert!(request.query.is_empty());
  }

  #[test]
  fn test_task_listing_omits_absent_filters() {
    let key = QueryKey::Tasks(TaskFilter {
      project_id: Some("P1".to_string()),
      ..TaskFilter::default()
    });
    let request = Routes::default().read_request(&key);
    assert_eq!(
      request.query,
      vec![("projectId".to_string(), "P1".to_string())]
    );
  }
}
