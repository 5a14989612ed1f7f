//! Reconciliation of server-confirmed mutations into the query cache.
//!
//! The same event or log can sit under several keys at once: a day-range
//! listing, a single-day view and a flat task-filtered listing. A [`Change`]
//! is applied to every entry that may contain the entity in one cache pass,
//! so no reader ever observes some copies patched and others not.
//!
//! Filters are never re-evaluated against an edited entity. An entry whose
//! filter the entity no longer satisfies keeps it until the entry is
//! invalidated or refetched.

mod tree;

use crate::api::gateway::FetchGateway;
use crate::api::types::{Event, EventPatch, Log, LogPatch, Project, ProjectPatch, Task, TaskPatch};
use crate::cache::{EntryUpdate, QueryCache, QueryData, QueryKey};
use crate::error::ReconciliationMiss;

use tree::Patch;

/// A server-confirmed mutation, carrying the canonical response.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
  EventCreated(Event),
  EventUpdated(EventPatch),
  EventDeleted { id: String },
  LogCreated(Log),
  LogUpdated(LogPatch),
  LogDeleted { id: String, event_id: String },
  TaskCreated(Task),
  TaskUpdated(TaskPatch),
  TaskDeleted { id: String },
  ProjectCreated(Project),
  ProjectUpdated(ProjectPatch),
  ProjectDeleted { id: String },
}

impl Change {
  /// Cheap pre-filter on keys that can possibly hold the entity.
  fn may_touch(&self, key: &QueryKey) -> bool {
    let event_view = key.is_day_view() || matches!(key, QueryKey::Events { .. });
    match self {
      Change::EventCreated(_)
      | Change::EventUpdated(_)
      | Change::EventDeleted { .. }
      | Change::LogCreated(_)
      | Change::LogUpdated(_)
      | Change::LogDeleted { .. } => event_view,
      Change::TaskCreated(_) => matches!(key, QueryKey::Tasks(_)),
      Change::TaskUpdated(patch) => {
        matches!(
          key,
          QueryKey::Tasks(_) | QueryKey::Task { .. } | QueryKey::TaskSearch { .. }
        ) || (event_view && patch.title.is_some())
      }
      Change::TaskDeleted { .. } => {
        matches!(key, QueryKey::Tasks(_) | QueryKey::TaskSearch { .. })
      }
      Change::ProjectCreated(_) => matches!(key, QueryKey::Projects),
      Change::ProjectUpdated(_) => matches!(key, QueryKey::Projects | QueryKey::Project { .. }),
      Change::ProjectDeleted { .. } => matches!(key, QueryKey::Projects),
    }
  }

  fn patch(&self, key: &QueryKey, data: &mut QueryData) -> Patch {
    match self {
      Change::EventCreated(event) => tree::create_event(key, data, event),
      Change::EventUpdated(patch) => tree::update_event(data, patch),
      Change::EventDeleted { id } => tree::delete_event(data, id),
      Change::LogCreated(log) => tree::create_log(data, log),
      Change::LogUpdated(patch) => tree::update_log(data, patch),
      Change::LogDeleted { id, event_id } => tree::delete_log(data, event_id, id),
      Change::TaskCreated(task) => tree::create_task(key, data, task),
      Change::TaskUpdated(patch) => match (data.tasks().is_some(), &patch.title) {
        (true, _) => tree::update_task(data, patch),
        (false, Some(title)) => tree::rename_task_on_events(data, &patch.id, title),
        (false, None) => Patch::Unchanged,
      },
      Change::TaskDeleted { id } => tree::delete_task(data, id),
      Change::ProjectCreated(project) => tree::create_project(key, data, project),
      Change::ProjectUpdated(patch) => tree::update_project(data, patch),
      Change::ProjectDeleted { id } => tree::delete_project(data, id),
    }
  }

  /// Detail entries that must disappear with the entity.
  fn detail_key(&self) -> Option<QueryKey> {
    match self {
      Change::TaskDeleted { id } => Some(QueryKey::task(id)),
      Change::ProjectDeleted { id } => Some(QueryKey::project(id)),
      _ => None,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Change::EventCreated(_) => "create event",
      Change::EventUpdated(_) => "update event",
      Change::EventDeleted { .. } => "delete event",
      Change::LogCreated(_) => "create log",
      Change::LogUpdated(_) => "update log",
      Change::LogDeleted { .. } => "delete log",
      Change::TaskCreated(_) => "create task",
      Change::TaskUpdated(_) => "update task",
      Change::TaskDeleted { .. } => "delete task",
      Change::ProjectCreated(_) => "create project",
      Change::ProjectUpdated(_) => "update project",
      Change::ProjectDeleted { .. } => "delete project",
    }
  }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
  /// Entries whose data changed
  pub patched: Vec<QueryKey>,
  /// Entries that should have held the entity but did not. They are left
  /// stale so the next read refetches them.
  pub misses: Vec<ReconciliationMiss>,
  /// Entries holding a newer copy than the response
  pub stale: Vec<QueryKey>,
  /// Detail entries dropped
  pub removed: usize,
}

/// Translates a [`Change`] into cache writes.
pub struct Reconciler;

impl Reconciler {
  pub fn apply<G: FetchGateway>(cache: &QueryCache<G>, change: &Change) -> ReconcileReport {
    let mut misses = Vec::new();
    let mut stale = Vec::new();

    let detail_key = change.detail_key();
    let mut removed = 0;

    let touched = cache.update_where(
      |key| change.may_touch(key) || detail_key.as_ref() == Some(key),
      |key, data| {
        if detail_key.as_ref() == Some(key) {
          removed += 1;
          return EntryUpdate::Remove;
        }
        let Some(data) = data else {
          return EntryUpdate::Unchanged;
        };
        let mut next = data.clone();
        match change.patch(key, &mut next) {
          Patch::Changed => EntryUpdate::Replace(next),
          Patch::Unchanged => EntryUpdate::Unchanged,
          Patch::Miss { entity, id } => {
            misses.push(ReconciliationMiss {
              key: key.clone(),
              entity,
              id,
            });
            EntryUpdate::Invalidate
          }
          Patch::Stale => {
            stale.push(key.clone());
            EntryUpdate::Unchanged
          }
        }
      },
    );
    let patched: Vec<QueryKey> = touched
      .into_iter()
      .filter(|key| detail_key.as_ref() != Some(key) && !misses.iter().any(|m| &m.key == key))
      .collect();

    for miss in &misses {
      tracing::debug!(change = change.name(), %miss, "reconciliation miss");
    }
    for key in &stale {
      tracing::debug!(
        change = change.name(),
        key = %key.description(),
        "cached copy is newer than response, skipped"
      );
    }
    tracing::debug!(
      change = change.name(),
      patched = patched.len(),
      removed,
      "reconciled"
    );

    ReconcileReport {
      patched,
      misses,
      stale,
      removed,
    }
  }
}
