//! In-place patches over cached pages.
//!
//! Each function mutates a private copy of one entry's data and reports
//! what happened. Nodes are located by id only; nothing here reorders
//! siblings or touches fields the change does not carry.

use chrono::{DateTime, Utc};

use crate::api::types::{
  Day, Event, EventPatch, Log, LogPatch, Project, ProjectPatch, Task, TaskPatch,
};
use crate::cache::{Page, QueryData, QueryKey};

/// Result of patching one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
  Changed,
  Unchanged,
  /// The entry should have held the entity (or its parent) but did not
  Miss { entity: &'static str, id: String },
  /// The response is older than what the entry already holds
  Stale,
}

impl Patch {
  fn changed_if(changed: bool) -> Self {
    if changed {
      Patch::Changed
    } else {
      Patch::Unchanged
    }
  }
}

/// `true` when `incoming` is known to be older than `current`.
fn is_older(incoming: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> bool {
  matches!((incoming, current), (Some(i), Some(c)) if i < c)
}

// ============================================================================
// Events
// ============================================================================

/// Every mutable event held by `data`, nested or flat.
fn events_mut(data: &mut QueryData) -> Box<dyn Iterator<Item = &mut Event> + '_> {
  match data {
    QueryData::Days(page) => Box::new(page.results.iter_mut().flat_map(|d| d.events.iter_mut())),
    QueryData::Stats(page) => Box::new(page.results.iter_mut().flat_map(|s| s.events.iter_mut())),
    QueryData::Events(page) => Box::new(page.results.iter_mut()),
    _ => Box::new(std::iter::empty()),
  }
}

fn day_matches(day: &Day, event: &Event) -> bool {
  match &event.day_id {
    Some(day_id) if *day_id == day.id => true,
    _ => event.day == Some(day.working_date),
  }
}

/// The day bucket a nested view lacks for `event`. Without a date or day id
/// there is no telling whether the view should have held it.
fn missing_day(key: &QueryKey, event: &Event) -> Patch {
  match (event.day, &event.day_id) {
    (Some(date), _) if key.covers_day(date) => Patch::Miss {
      entity: "day",
      id: date.to_string(),
    },
    (None, Some(day_id)) => Patch::Miss {
      entity: "day",
      id: day_id.clone(),
    },
    _ => Patch::Unchanged,
  }
}

fn flat_filter_matches(key: &QueryKey, event: &Event) -> bool {
  match key {
    QueryKey::Events { day, task_id } => {
      day.map_or(true, |d| event.day == Some(d))
        && task_id
          .as_ref()
          .map_or(true, |t| event.task_id.as_ref() == Some(t))
    }
    _ => false,
  }
}

/// Append a new event to the matching day (nested) or list (flat).
pub fn create_event(key: &QueryKey, data: &mut QueryData, event: &Event) -> Patch {
  match data {
    QueryData::Days(page) => {
      if event.day.is_some_and(|date| !key.covers_day(date)) {
        return Patch::Unchanged;
      }
      let Some(day) = page.results.iter_mut().find(|d| day_matches(d, event)) else {
        return missing_day(key, event);
      };
      let mut event = event.clone();
      event.day = Some(day.working_date);
      if event.day_id.is_none() {
        event.day_id = Some(day.id.clone());
      }
      upsert_event(&mut day.events, &event)
    }
    QueryData::Stats(page) => {
      let Some(date) = event.day.filter(|date| key.covers_day(*date)) else {
        return Patch::Unchanged;
      };
      match page.results.iter_mut().find(|s| s.day == date) {
        Some(stat) => upsert_event(&mut stat.events, event),
        None => missing_day(key, event),
      }
    }
    QueryData::Events(page) => {
      if !flat_filter_matches(key, event) {
        return Patch::Unchanged;
      }
      let existed = page.results.iter().any(|e| e.id == event.id);
      let patch = upsert_event(&mut page.results, event);
      if !existed {
        page.bump_total(1);
      }
      patch
    }
    _ => Patch::Unchanged,
  }
}

/// Append, or replace when the same id was already reconciled.
fn upsert_event(events: &mut Vec<Event>, event: &Event) -> Patch {
  match events.iter_mut().find(|e| e.id == event.id) {
    Some(existing) if *existing == *event => Patch::Unchanged,
    Some(existing) => {
      *existing = event.clone();
      Patch::Changed
    }
    None => {
      events.push(event.clone());
      Patch::Changed
    }
  }
}

/// Merge the fields an update returned into every copy of the event.
pub fn update_event(data: &mut QueryData, patch: &EventPatch) -> Patch {
  let mut result = Patch::Unchanged;
  for event in events_mut(data).filter(|e| e.id == patch.id) {
    if is_older(patch.modified_at, event.modified_at) {
      result = Patch::Stale;
      continue;
    }
    let before = event.clone();
    patch.apply_to(event);
    if *event != before {
      result = Patch::Changed;
    }
  }
  result
}

/// Remove the event, and with it its logs.
pub fn delete_event(data: &mut QueryData, id: &str) -> Patch {
  match data {
    QueryData::Days(page) => {
      let mut changed = false;
      for day in page.results.iter_mut() {
        let before = day.events.len();
        day.events.retain(|e| e.id != id);
        changed |= day.events.len() != before;
      }
      Patch::changed_if(changed)
    }
    QueryData::Stats(page) => {
      let removed: usize = page
        .results
        .iter_mut()
        .map(|s| remove_by(&mut s.events, |e| e.id == id))
        .sum();
      Patch::changed_if(removed > 0)
    }
    QueryData::Events(page) => {
      let removed = remove_by(&mut page.results, |e| e.id == id);
      page.bump_total(-(removed as i64));
      Patch::changed_if(removed > 0)
    }
    _ => Patch::Unchanged,
  }
}

/// Keep cached `taskTitle` copies in line with a renamed task.
pub fn rename_task_on_events(data: &mut QueryData, task_id: &str, title: &str) -> Patch {
  let mut changed = false;
  for event in events_mut(data) {
    if event.task_id.as_deref() == Some(task_id) && event.task_title.as_deref() != Some(title) {
      event.task_title = Some(title.to_string());
      changed = true;
    }
  }
  Patch::changed_if(changed)
}

// ============================================================================
// Logs
// ============================================================================

fn owning_event<'a>(data: &'a mut QueryData, event_id: &str) -> Option<&'a mut Event> {
  events_mut(data).find(|e| e.id == event_id)
}

/// Append a log to its owning event. Totals are derived by readers.
pub fn create_log(data: &mut QueryData, log: &Log) -> Patch {
  let Some(event) = owning_event(data, &log.event_id) else {
    return Patch::Unchanged;
  };
  match event.logs.iter_mut().find(|l| l.id == log.id) {
    Some(existing) if *existing == *log => Patch::Unchanged,
    Some(existing) => {
      *existing = log.clone();
      Patch::Changed
    }
    None => {
      event.logs.push(log.clone());
      Patch::Changed
    }
  }
}

/// Locate the owning event first, then the log inside it.
pub fn update_log(data: &mut QueryData, patch: &LogPatch) -> Patch {
  let Some(event) = owning_event(data, &patch.event_id) else {
    return Patch::Unchanged;
  };
  let Some(log) = event.logs.iter_mut().find(|l| l.id == patch.id) else {
    return Patch::Miss {
      entity: "log",
      id: patch.id.clone(),
    };
  };
  if is_older(patch.modified_at, log.modified_at) {
    return Patch::Stale;
  }
  let before = log.clone();
  patch.apply_to(log);
  Patch::changed_if(*log != before)
}

pub fn delete_log(data: &mut QueryData, event_id: &str, log_id: &str) -> Patch {
  let Some(event) = owning_event(data, event_id) else {
    return Patch::Unchanged;
  };
  if remove_by(&mut event.logs, |l| l.id == log_id) == 0 {
    return Patch::Miss {
      entity: "log",
      id: log_id.to_string(),
    };
  }
  Patch::Changed
}

// ============================================================================
// Tasks and projects
// ============================================================================

/// Append a new task to listings whose filter it satisfies.
pub fn create_task(key: &QueryKey, data: &mut QueryData, task: &Task) -> Patch {
  let (QueryKey::Tasks(filter), QueryData::Tasks(page)) = (key, data) else {
    return Patch::Unchanged;
  };
  if !filter.matches(task) || page.results.iter().any(|t| t.id == task.id) {
    return Patch::Unchanged;
  }
  append_within_window(page, task.clone());
  Patch::Changed
}

pub fn update_task(data: &mut QueryData, patch: &TaskPatch) -> Patch {
  let QueryData::Tasks(page) = data else {
    return Patch::Unchanged;
  };
  merge_by_id(
    &mut page.results,
    &patch.id,
    |t| t.modified_at,
    patch.modified_at,
    |t| patch.apply_to(t),
    |t| &t.id,
  )
}

pub fn delete_task(data: &mut QueryData, id: &str) -> Patch {
  let QueryData::Tasks(page) = data else {
    return Patch::Unchanged;
  };
  let removed = remove_by(&mut page.results, |t| t.id == id);
  page.bump_total(-(removed as i64));
  Patch::changed_if(removed > 0)
}

pub fn create_project(key: &QueryKey, data: &mut QueryData, project: &Project) -> Patch {
  let (QueryKey::Projects, QueryData::Projects(page)) = (key, data) else {
    return Patch::Unchanged;
  };
  if page.results.iter().any(|p| p.id == project.id) {
    return Patch::Unchanged;
  }
  append_within_window(page, project.clone());
  Patch::Changed
}

pub fn update_project(data: &mut QueryData, patch: &ProjectPatch) -> Patch {
  let QueryData::Projects(page) = data else {
    return Patch::Unchanged;
  };
  merge_by_id(
    &mut page.results,
    &patch.id,
    |p| p.modified_at,
    patch.modified_at,
    |p| patch.apply_to(p),
    |p| &p.id,
  )
}

pub fn delete_project(data: &mut QueryData, id: &str) -> Patch {
  let QueryData::Projects(page) = data else {
    return Patch::Unchanged;
  };
  let removed = remove_by(&mut page.results, |p| p.id == id);
  page.bump_total(-(removed as i64));
  Patch::changed_if(removed > 0)
}

// ============================================================================
// Helpers
// ============================================================================

/// Append unless that would break the page's pagination window, in which
/// case only the total moves.
fn append_within_window<T>(page: &mut Page<T>, item: T) {
  if !page.is_window_closed() {
    page.results.push(item);
  }
  page.bump_total(1);
}

fn remove_by<T>(items: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> usize {
  let before = items.len();
  items.retain(|item| !pred(item));
  before - items.len()
}

fn merge_by_id<T: Clone + PartialEq>(
  items: &mut [T],
  id: &str,
  modified_at: impl Fn(&T) -> Option<DateTime<Utc>>,
  incoming: Option<DateTime<Utc>>,
  apply: impl Fn(&mut T),
  id_of: impl Fn(&T) -> &String,
) -> Patch {
  let mut result = Patch::Unchanged;
  for item in items.iter_mut().filter(|i| id_of(i) == id) {
    if is_older(incoming, modified_at(item)) {
      result = Patch::Stale;
      continue;
    }
    let before = item.clone();
    apply(item);
    if *item != before {
      result = Patch::Changed;
    }
  }
  result
}
