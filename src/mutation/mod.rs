//! Write API over the query cache.
//!
//! Every call runs validate, send, reconcile in that order. The cache is
//! only written after the server accepted the change, so a failed call
//! leaves every entry exactly as it was.

mod state;

pub use state::{MutationState, PendingMutation};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::api::api_types::ApiResponse;
use crate::api::gateway::{ApiRequest, Entity, FetchGateway};
use crate::api::payloads::{
  validate_id, EventEdit, LogEdit, NewEvent, NewLog, NewProject, NewTask, ProjectEdit, TaskEdit,
};
use crate::api::types::{Event, EventPatch, Log, LogPatch, Project, ProjectPatch, Task, TaskPatch};
use crate::cache::{QueryCache, QueryKey};
use crate::error::PmError;
use crate::reconcile::{Change, ReconcileReport, Reconciler};

/// Issues writes and keeps the cache in line with their responses.
pub struct MutationCoordinator<G: FetchGateway> {
  cache: QueryCache<G>,
}

impl<G: FetchGateway> Clone for MutationCoordinator<G> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
    }
  }
}

impl<G: FetchGateway> MutationCoordinator<G> {
  pub fn new(cache: QueryCache<G>) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &QueryCache<G> {
    &self.cache
  }

  // ==========================================================================
  // Events
  // ==========================================================================

  pub async fn create_event(&self, event: NewEvent) -> Result<Event, PmError> {
    event.validate()?;
    let request = ApiRequest::post(self.collection(Entity::Event), to_body(&event)?);
    let mut created: Event = self.send("create event", request).await?.decode_first()?;
    if created.day.is_none() {
      created.day = Some(event.day);
    }
    self.reconcile(Change::EventCreated(created.clone()));
    Ok(created)
  }

  pub async fn edit_event(&self, edit: EventEdit) -> Result<EventPatch, PmError> {
    edit.validate()?;
    let request = ApiRequest::patch(self.member(Entity::Event, &edit.id), to_body(&edit)?);
    let response = self.send("update event", request).await?;
    let patch = first_or(response, || EventPatch {
      id: edit.id.clone(),
      title: edit.title.clone(),
      task_id: edit.task_id.clone().map(Some),
      ..EventPatch::default()
    })?;
    self.reconcile(Change::EventUpdated(patch.clone()));
    Ok(patch)
  }

  pub async fn delete_event(&self, id: &str) -> Result<(), PmError> {
    validate_id("event", id)?;
    let request = ApiRequest::delete(self.member(Entity::Event, id));
    self.send("delete event", request).await?;
    self.reconcile(Change::EventDeleted { id: id.to_string() });
    Ok(())
  }

  // ==========================================================================
  // Logs
  // ==========================================================================

  pub async fn create_log(&self, log: NewLog) -> Result<Log, PmError> {
    log.validate()?;
    let request = ApiRequest::post(self.collection(Entity::Log), to_body(&log)?);
    let mut created: Log = self.send("create log", request).await?.decode_first()?;
    if created.event_id.is_empty() {
      created.event_id = log.event_id;
    }
    self.reconcile(Change::LogCreated(created.clone()));
    Ok(created)
  }

  pub async fn edit_log(&self, edit: LogEdit) -> Result<LogPatch, PmError> {
    edit.validate()?;
    let request = ApiRequest::patch(self.member(Entity::Log, &edit.id), to_body(&edit)?);
    let response = self.send("update log", request).await?;
    let mut patch = first_or(response, || LogPatch {
      id: edit.id.clone(),
      event_id: edit.event_id.clone(),
      title: edit.title.clone(),
      duration: edit.duration,
      modified_at: None,
    })?;
    if patch.event_id.is_empty() {
      patch.event_id = edit.event_id;
    }
    self.reconcile(Change::LogUpdated(patch.clone()));
    Ok(patch)
  }

  /// The owning event bounds the search for the log in every entry.
  pub async fn delete_log(&self, id: &str, event_id: &str) -> Result<(), PmError> {
    validate_id("log", id)?;
    validate_id("event", event_id)?;
    let request = ApiRequest::delete(self.member(Entity::Log, id));
    self.send("delete log", request).await?;
    self.reconcile(Change::LogDeleted {
      id: id.to_string(),
      event_id: event_id.to_string(),
    });
    Ok(())
  }

  // ==========================================================================
  // Tasks
  // ==========================================================================

  pub async fn create_task(&self, task: NewTask) -> Result<Task, PmError> {
    task.validate()?;
    let request = ApiRequest::post(self.collection(Entity::Task), to_body(&task)?);
    let created: Task = self.send("create task", request).await?.decode_first()?;
    self.reconcile(Change::TaskCreated(created.clone()));
    self.invalidate_project_counts();
    Ok(created)
  }

  pub async fn edit_task(&self, edit: TaskEdit) -> Result<TaskPatch, PmError> {
    edit.validate()?;
    let request = ApiRequest::patch(self.member(Entity::Task, &edit.id), to_body(&edit)?);
    let response = self.send("update task", request).await?;
    let patch = first_or(response, || TaskPatch {
      id: edit.id.clone(),
      project_id: edit.project_id.clone().map(Some),
      title: edit.title.clone(),
      description: edit.description.clone().map(Some),
      pl: edit.pl.clone().map(Some),
      jira_link: edit.jira_link.clone().map(Some),
      due_date: edit.due_date,
      status: edit.status,
      modified_at: None,
    })?;
    self.reconcile(Change::TaskUpdated(patch.clone()));
    self.invalidate_project_counts();
    Ok(patch)
  }

  pub async fn delete_task(&self, id: &str) -> Result<(), PmError> {
    validate_id("task", id)?;
    let request = ApiRequest::delete(self.member(Entity::Task, id));
    self.send("delete task", request).await?;
    self.reconcile(Change::TaskDeleted { id: id.to_string() });
    self.invalidate_project_counts();
    Ok(())
  }

  // ==========================================================================
  // Projects
  // ==========================================================================

  pub async fn create_project(&self, project: NewProject) -> Result<Project, PmError> {
    project.validate()?;
    let request = ApiRequest::post(self.collection(Entity::Project), to_body(&project)?);
    let created: Project = self.send("create project", request).await?.decode_first()?;
    self.reconcile(Change::ProjectCreated(created.clone()));
    Ok(created)
  }

  pub async fn edit_project(&self, edit: ProjectEdit) -> Result<ProjectPatch, PmError> {
    edit.validate()?;
    let request = ApiRequest::patch(self.member(Entity::Project, &edit.id), to_body(&edit)?);
    let response = self.send("update project", request).await?;
    let patch = first_or(response, || ProjectPatch {
      id: edit.id.clone(),
      title: edit.title.clone(),
      description: edit.description.clone().map(Some),
      pl: edit.pl.clone(),
      ..ProjectPatch::default()
    })?;
    self.reconcile(Change::ProjectUpdated(patch.clone()));
    Ok(patch)
  }

  pub async fn delete_project(&self, id: &str) -> Result<(), PmError> {
    validate_id("project", id)?;
    let request = ApiRequest::delete(self.member(Entity::Project, id));
    self.send("delete project", request).await?;
    self.reconcile(Change::ProjectDeleted { id: id.to_string() });
    Ok(())
  }

  // ==========================================================================
  // Helpers
  // ==========================================================================

  fn collection(&self, entity: Entity) -> String {
    self.cache.routes().collection(entity).to_string()
  }

  fn member(&self, entity: Entity, id: &str) -> String {
    self.cache.routes().member(entity, id)
  }

  async fn send(&self, op: &'static str, request: ApiRequest) -> Result<ApiResponse<Value>, PmError> {
    tracing::debug!(op, method = request.method.as_str(), path = %request.path, "sending mutation");
    self
      .cache
      .gateway()
      .send(self.cache.session(), request)
      .await
      .inspect_err(|e| tracing::warn!(op, error = %e, "mutation failed"))
  }

  fn reconcile(&self, change: Change) -> ReconcileReport {
    let report = Reconciler::apply(&self.cache, &change);
    tracing::info!(
      op = change.name(),
      patched = report.patched.len(),
      misses = report.misses.len(),
      "mutation applied"
    );
    report
  }

  /// Project task counts are computed by the server.
  fn invalidate_project_counts(&self) {
    self
      .cache
      .invalidate_where(|key| matches!(key, QueryKey::Projects | QueryKey::Project { .. }));
  }
}

fn to_body(payload: &impl Serialize) -> Result<Value, PmError> {
  serde_json::to_value(payload)
    .map_err(|e| PmError::precondition(format!("Failed to encode request: {}", e)))
}

/// Decode the affected entity, or fall back to what was sent when the
/// server answered with an empty envelope.
fn first_or<T: DeserializeOwned>(
  response: ApiResponse<Value>,
  fallback: impl FnOnce() -> T,
) -> Result<T, PmError> {
  if response.results.is_empty() {
    return Ok(fallback());
  }
  response.decode_first()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::gateway::{Method, Routes};
  use crate::api::payloads::InitialLog;
  use crate::api::session::Session;
  use crate::api::testing::{day_json, envelope, event_json, log_json, ok, task_json, FakeGateway};
  use crate::api::types::TaskStatus;
  use crate::cache::{QueryStatus, TaskFilter};
  use chrono::NaiveDate;
  use serde_json::json;
  use std::sync::Arc;

  fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  fn day_key() -> QueryKey {
    QueryKey::day(date("2024-03-01"))
  }

  fn range_key() -> QueryKey {
    QueryKey::day_range(Some(date("2024-02-26")), Some(date("2024-03-03")))
  }

  fn standup() -> Value {
    event_json("E1", "Standup", "2024-03-01", vec![log_json("L1", "E1", 0.5)])
  }

  /// Day 2024-03-01 cached under a single-day view and a week range.
  async fn coordinator() -> MutationCoordinator<FakeGateway> {
    let gateway = Arc::new(FakeGateway::new());
    gateway.reply(
      Method::Get,
      "/days",
      ok(vec![day_json("D1", "2024-03-01", vec![standup()])]),
    );
    gateway.reply(
      Method::Get,
      "/days",
      ok(vec![day_json("D1", "2024-03-01", vec![standup()])]),
    );
    let cache = QueryCache::new(gateway, Session::new("token"), Routes::default());
    cache.fetch(&day_key()).await.unwrap();
    cache.fetch(&range_key()).await.unwrap();
    MutationCoordinator::new(cache)
  }

  fn duration_of(coordinator: &MutationCoordinator<FakeGateway>, key: &QueryKey) -> Option<f64> {
    let data = coordinator.cache().get(key)?;
    data.find_log("E1", "L1").map(|l| l.duration)
  }

  #[tokio::test]
  async fn test_edit_log_reaches_both_day_views() {
    let coordinator = coordinator().await;
    coordinator.cache().gateway().reply(
      Method::Patch,
      "/logs/L1",
      ok(vec![json!({ "id": "L1", "eventId": "E1", "duration": 1.0 })]),
    );

    let patch = coordinator
      .edit_log(LogEdit {
        id: "L1".to_string(),
        event_id: "E1".to_string(),
        title: None,
        duration: Some(1.0),
      })
      .await
      .unwrap();

    assert_eq!(patch.duration, Some(1.0));
    assert_eq!(duration_of(&coordinator, &day_key()), Some(1.0));
    assert_eq!(duration_of(&coordinator, &range_key()), Some(1.0));
    // Reconciled in place, no refetch
    assert_eq!(coordinator.cache().gateway().count(Method::Get, "/days"), 2);
  }

  #[tokio::test]
  async fn test_response_without_event_id_uses_request() {
    let coordinator = coordinator().await;
    coordinator.cache().gateway().reply(
      Method::Patch,
      "/logs/L1",
      ok(vec![json!({ "id": "L1", "duration": 2.0 })]),
    );

    let patch = coordinator
      .edit_log(LogEdit {
        id: "L1".to_string(),
        event_id: "E1".to_string(),
        title: None,
        duration: Some(2.0),
      })
      .await
      .unwrap();

    assert_eq!(patch.event_id, "E1");
    assert_eq!(duration_of(&coordinator, &day_key()), Some(2.0));
  }

  #[tokio::test]
  async fn test_failed_write_leaves_cache_untouched() {
    let coordinator = coordinator().await;
    coordinator.cache().gateway().reply(
      Method::Patch,
      "/logs/L1",
      Err(PmError::http(500, Some("Database unavailable".to_string()))),
    );
    let before = coordinator.cache().get(&day_key());

    let err = coordinator
      .edit_log(LogEdit {
        id: "L1".to_string(),
        event_id: "E1".to_string(),
        title: None,
        duration: Some(1.0),
      })
      .await
      .unwrap_err();

    assert!(err.is_network());
    assert_eq!(err.to_string(), "Database unavailable");
    assert_eq!(coordinator.cache().get(&day_key()), before);
    assert_eq!(duration_of(&coordinator, &range_key()), Some(0.5));
  }

  #[tokio::test]
  async fn test_invalid_payload_is_never_sent() {
    let coordinator = coordinator().await;
    let err = coordinator
      .create_log(NewLog {
        event_id: "E1".to_string(),
        title: "Review".to_string(),
        duration: 0.3,
      })
      .await
      .unwrap_err();

    assert!(err.is_precondition());
    assert_eq!(coordinator.cache().gateway().count(Method::Post, "/logs"), 0);
  }

  #[tokio::test]
  async fn test_missing_credential_is_a_precondition() {
    let gateway = Arc::new(FakeGateway::new());
    let cache = QueryCache::new(gateway, Session::anonymous(), Routes::default());
    let coordinator = MutationCoordinator::new(cache);

    let err = coordinator.delete_event("E1").await.unwrap_err();
    assert!(err.is_precondition());
    assert!(coordinator.cache().gateway().requests().is_empty());
  }

  #[tokio::test]
  async fn test_create_event_with_initial_log() {
    let coordinator = coordinator().await;
    coordinator.cache().gateway().reply(
      Method::Post,
      "/events",
      ok(vec![event_json(
        "E2",
        "Review",
        "2024-03-01",
        vec![log_json("L5", "E2", 1.5)],
      )]),
    );

    let created = coordinator
      .create_event(NewEvent {
        title: "Review".to_string(),
        day: date("2024-03-01"),
        task_id: None,
        log: Some(InitialLog {
          title: "Review".to_string(),
          duration: 1.5,
        }),
      })
      .await
      .unwrap();

    assert_eq!(created.id, "E2");
    let requests = coordinator.cache().gateway().requests();
    let body = requests.last().and_then(|r| r.body.clone()).unwrap();
    assert_eq!(body["day"], json!("2024-03-01"));
    assert_eq!(body["log"]["duration"], json!(1.5));

    for key in [day_key(), range_key()] {
      let data = coordinator.cache().get(&key).unwrap();
      assert_eq!(data.find_event("E2").map(|e| e.total_duration()), Some(1.5));
    }
  }

  #[tokio::test]
  async fn test_edit_event_keeps_logs() {
    let coordinator = coordinator().await;
    coordinator.cache().gateway().reply(
      Method::Patch,
      "/events/E1",
      ok(vec![json!({ "id": "E1", "title": "Daily" })]),
    );

    coordinator
      .edit_event(EventEdit {
        id: "E1".to_string(),
        title: Some("Daily".to_string()),
        task_id: None,
      })
      .await
      .unwrap();

    for key in [day_key(), range_key()] {
      let data = coordinator.cache().get(&key).unwrap();
      let event = data.find_event("E1").unwrap();
      assert_eq!(event.title, "Daily");
      assert_eq!(event.logs.len(), 1);
    }
  }

  #[tokio::test]
  async fn test_empty_edit_response_falls_back_to_request() {
    let coordinator = coordinator().await;
    coordinator
      .cache()
      .gateway()
      .reply(Method::Patch, "/events/E1", Ok(envelope(vec![])));

    let patch = coordinator
      .edit_event(EventEdit {
        id: "E1".to_string(),
        title: Some("Sync".to_string()),
        task_id: None,
      })
      .await
      .unwrap();

    assert_eq!(patch.title.as_deref(), Some("Sync"));
    let data = coordinator.cache().get(&day_key()).unwrap();
    assert_eq!(data.find_event("E1").map(|e| e.title.as_str()), Some("Sync"));
  }

  #[tokio::test]
  async fn test_delete_log_then_event() {
    let coordinator = coordinator().await;
    let gateway = coordinator.cache().gateway().clone();
    gateway.reply(Method::Delete, "/logs/L1", Ok(envelope(vec![])));
    gateway.reply(Method::Delete, "/events/E1", Ok(envelope(vec![])));

    coordinator.delete_log("L1", "E1").await.unwrap();
    let data = coordinator.cache().get(&range_key()).unwrap();
    assert_eq!(data.find_event("E1").map(|e| e.total_duration()), Some(0.0));

    coordinator.delete_event("E1").await.unwrap();
    for key in [day_key(), range_key()] {
      assert!(coordinator.cache().get(&key).unwrap().find_event("E1").is_none());
    }
  }

  #[tokio::test]
  async fn test_task_mutation_marks_projects_stale() {
    let coordinator = coordinator().await;
    let gateway = coordinator.cache().gateway().clone();
    gateway.reply(
      Method::Get,
      "/projects",
      ok(vec![json!({ "id": "P1", "title": "Website", "pl": "ana" })]),
    );
    gateway.reply(Method::Get, "/tasks", ok(vec![]));
    coordinator.cache().fetch(&QueryKey::Projects).await.unwrap();
    let all_tasks = QueryKey::tasks(TaskFilter::default());
    coordinator.cache().fetch(&all_tasks).await.unwrap();

    gateway.reply(
      Method::Post,
      "/tasks",
      ok(vec![task_json("T9", "Landing page", "upcoming")]),
    );
    coordinator
      .create_task(NewTask {
        project_id: Some("P1".to_string()),
        title: "Landing page".to_string(),
        description: None,
        pl: None,
        jira_link: None,
        due_date: date("2024-04-01"),
        status: TaskStatus::Upcoming,
      })
      .await
      .unwrap();

    assert_eq!(coordinator.cache().get(&all_tasks).unwrap().len(), 1);
    let projects = coordinator.cache().peek(&QueryKey::Projects).unwrap();
    assert!(projects.is_stale);
    assert_eq!(projects.status, QueryStatus::Success);
  }

  #[tokio::test]
  async fn test_project_lifecycle() {
    let coordinator = coordinator().await;
    let gateway = coordinator.cache().gateway().clone();
    gateway.reply(Method::Get, "/projects", ok(vec![]));
    coordinator.cache().fetch(&QueryKey::Projects).await.unwrap();

    gateway.reply(
      Method::Post,
      "/projects",
      ok(vec![json!({ "id": "P2", "title": "Intranet", "pl": "ben" })]),
    );
    gateway.reply(
      Method::Patch,
      "/projects/P2",
      ok(vec![json!({ "id": "P2", "title": "Intranet v2" })]),
    );
    gateway.reply(Method::Delete, "/projects/P2", Ok(envelope(vec![])));

    coordinator
      .create_project(NewProject {
        title: "Intranet".to_string(),
        description: None,
        pl: "ben".to_string(),
      })
      .await
      .unwrap();
    coordinator
      .edit_project(ProjectEdit {
        id: "P2".to_string(),
        title: Some("Intranet v2".to_string()),
        ..ProjectEdit::default()
      })
      .await
      .unwrap();

    let data = coordinator.cache().get(&QueryKey::Projects).unwrap();
    let project = &data.projects().unwrap()[0];
    assert_eq!(project.title, "Intranet v2");
    assert_eq!(project.pl, "ben");

    coordinator.delete_project("P2").await.unwrap();
    assert!(coordinator.cache().get(&QueryKey::Projects).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_concurrent_edits_both_settle() {
    let coordinator = coordinator().await;
    let gateway = coordinator.cache().gateway().clone();
    let release = gateway.reply_gated(
      Method::Patch,
      "/logs/L1",
      ok(vec![json!({ "id": "L1", "eventId": "E1", "duration": 1.0 })]),
    );
    gateway.reply(
      Method::Patch,
      "/logs/L1",
      ok(vec![json!({ "id": "L1", "eventId": "E1", "duration": 2.0 })]),
    );

    let edit = |duration| LogEdit {
      id: "L1".to_string(),
      event_id: "E1".to_string(),
      title: None,
      duration: Some(duration),
    };
    let first = coordinator.clone();
    let mut slow = PendingMutation::spawn(async move { first.edit_log(edit(1.0)).await });
    tokio::task::yield_now().await;
    let second = coordinator.clone();
    let mut fast = PendingMutation::spawn(async move { second.edit_log(edit(2.0)).await });

    assert!(fast.wait().await.is_success());
    assert!(slow.is_pending());
    release.send(()).unwrap();
    assert!(slow.wait().await.is_success());

    // Last response to reconcile wins
    assert_eq!(duration_of(&coordinator, &day_key()), Some(1.0));
  }
}
