//! Domain entities: projects, tasks and the Day -> Event -> Log hierarchy.
//!
//! These types deserialize directly from the backend's camelCase JSON.
//! Totals derived from logs are never read from the wire; they are computed
//! from the nested logs every time they are asked for.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Task workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
  Upcoming,
  InProgress,
  Done,
}

impl TaskStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskStatus::Upcoming => "upcoming",
      TaskStatus::InProgress => "in-progress",
      TaskStatus::Done => "done",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "upcoming" => Some(TaskStatus::Upcoming),
      "in-progress" | "inprogress" | "in_progress" => Some(TaskStatus::InProgress),
      "done" => Some(TaskStatus::Done),
      _ => None,
    }
  }
}

/// Project with server-computed task counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  /// Program lead
  #[serde(default)]
  pub pl: String,
  #[serde(default)]
  pub upcoming_tasks: u32,
  #[serde(default)]
  pub in_progress_tasks: u32,
  #[serde(default)]
  pub done_tasks: u32,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

/// Task belonging (weakly) to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: String,
  #[serde(default)]
  pub project_id: Option<String>,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  /// Program lead
  #[serde(default)]
  pub pl: Option<String>,
  /// External tracker link
  #[serde(default)]
  pub jira_link: Option<String>,
  #[serde(default, deserialize_with = "deserialize_opt_date")]
  pub due_date: Option<NaiveDate>,
  pub status: TaskStatus,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

/// A working day owning its events in the nested views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
  pub id: String,
  #[serde(alias = "day", deserialize_with = "deserialize_date")]
  pub working_date: NaiveDate,
  #[serde(default)]
  pub start_of_work: f64,
  #[serde(default)]
  pub events: Vec<Event>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

impl Day {
  /// Hours logged across all events of the day.
  pub fn worked_hours(&self) -> f64 {
    self.events.iter().map(Event::total_duration).sum()
  }

  pub fn event(&self, id: &str) -> Option<&Event> {
    self.events.iter().find(|e| e.id == id)
  }

  /// Stamp nested events with this day, which the backend may leave out.
  pub fn adopt_events(&mut self) {
    for event in &mut self.events {
      if event.day.is_none() {
        event.day = Some(self.working_date);
      }
      if event.day_id.is_none() {
        event.day_id = Some(self.id.clone());
      }
    }
  }
}

/// Booked time for one date of a statistics range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
  #[serde(alias = "workingDate", deserialize_with = "deserialize_date")]
  pub day: NaiveDate,
  #[serde(default)]
  pub events: Vec<Event>,
}

impl Stat {
  pub fn worked_hours(&self) -> f64 {
    self.events.iter().map(Event::total_duration).sum()
  }

  pub fn adopt_events(&mut self) {
    for event in &mut self.events {
      if event.day.is_none() {
        event.day = Some(self.day);
      }
    }
  }
}

/// Something that happened on a day, optionally tied to a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
  pub id: String,
  pub title: String,
  /// Absent on the wire for events nested under their day
  #[serde(default, alias = "workingDate", deserialize_with = "deserialize_opt_date")]
  pub day: Option<NaiveDate>,
  #[serde(default)]
  pub day_id: Option<String>,
  #[serde(default)]
  pub task_id: Option<String>,
  #[serde(default)]
  pub task_title: Option<String>,
  #[serde(default)]
  pub logs: Vec<Log>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

impl Event {
  /// Sum of the durations of the event's logs, computed on every call.
  pub fn total_duration(&self) -> f64 {
    self.logs.iter().map(|l| l.duration).sum()
  }

  pub fn log(&self, id: &str) -> Option<&Log> {
    self.logs.iter().find(|l| l.id == id)
  }
}

/// A slice of time spent on an event, in hours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
  pub id: String,
  #[serde(default)]
  pub event_id: String,
  pub title: String,
  pub duration: f64,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Partial records returned by update endpoints
// ============================================================================
//
// An update response may omit fields. Merging only what is present keeps
// nested logs and untouched fields intact in every cached copy.

/// Fields of an event as returned by an update. Absent fields stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
  pub id: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default, alias = "workingDate", deserialize_with = "deserialize_some_date")]
  pub day: Option<NaiveDate>,
  #[serde(default, deserialize_with = "deserialize_some")]
  pub task_id: Option<Option<String>>,
  #[serde(default, deserialize_with = "deserialize_some")]
  pub task_title: Option<Option<String>>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

impl EventPatch {
  /// Merge into an event. Logs are never replaced by an event update.
  pub fn apply_to(&self, event: &mut Event) {
    if let Some(title) = &self.title {
      event.title = title.clone();
    }
    if self.day.is_some() {
      event.day = self.day;
    }
    if let Some(task_id) = &self.task_id {
      event.task_id = task_id.clone();
    }
    if let Some(task_title) = &self.task_title {
      event.task_title = task_title.clone();
    }
    if self.modified_at.is_some() {
      event.modified_at = self.modified_at;
    }
  }
}

/// Fields of a log as returned by an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPatch {
  pub id: String,
  #[serde(default)]
  pub event_id: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub duration: Option<f64>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

impl LogPatch {
  pub fn apply_to(&self, log: &mut Log) {
    if let Some(title) = &self.title {
      log.title = title.clone();
    }
    if let Some(duration) = self.duration {
      log.duration = duration;
    }
    if self.modified_at.is_some() {
      log.modified_at = self.modified_at;
    }
  }
}

/// Fields of a task as returned by an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  pub id: String,
  #[serde(default, deserialize_with = "deserialize_some")]
  pub project_id: Option<Option<String>>,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default, deserialize_with = "deserialize_some")]
  pub description: Option<Option<String>>,
  #[serde(default, deserialize_with = "deserialize_some")]
  pub pl: Option<Option<String>>,
  #[serde(default, deserialize_with = "deserialize_some")]
  pub jira_link: Option<Option<String>>,
  #[serde(default, deserialize_with = "deserialize_some_date")]
  pub due_date: Option<NaiveDate>,
  #[serde(default)]
  pub status: Option<TaskStatus>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
  pub fn apply_to(&self, task: &mut Task) {
    if let Some(project_id) = &self.project_id {
      task.project_id = project_id.clone();
    }
    if let Some(title) = &self.title {
      task.title = title.clone();
    }
    if let Some(description) = &self.description {
      task.description = description.clone();
    }
    if let Some(pl) = &self.pl {
      task.pl = pl.clone();
    }
    if let Some(link) = &self.jira_link {
      task.jira_link = link.clone();
    }
    if self.due_date.is_some() {
      task.due_date = self.due_date;
    }
    if let Some(status) = self.status {
      task.status = status;
    }
    if self.modified_at.is_some() {
      task.modified_at = self.modified_at;
    }
  }
}

/// Fields of a project as returned by an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
  pub id: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default, deserialize_with = "deserialize_some")]
  pub description: Option<Option<String>>,
  #[serde(default)]
  pub pl: Option<String>,
  #[serde(default)]
  pub upcoming_tasks: Option<u32>,
  #[serde(default)]
  pub in_progress_tasks: Option<u32>,
  #[serde(default)]
  pub done_tasks: Option<u32>,
  #[serde(default)]
  pub modified_at: Option<DateTime<Utc>>,
}

impl ProjectPatch {
  pub fn apply_to(&self, project: &mut Project) {
    if let Some(title) = &self.title {
      project.title = title.clone();
    }
    if let Some(description) = &self.description {
      project.description = description.clone();
    }
    if let Some(pl) = &self.pl {
      project.pl = pl.clone();
    }
    if let Some(n) = self.upcoming_tasks {
      project.upcoming_tasks = n;
    }
    if let Some(n) = self.in_progress_tasks {
      project.in_progress_tasks = n;
    }
    if let Some(n) = self.done_tasks {
      project.done_tasks = n;
    }
    if self.modified_at.is_some() {
      project.modified_at = self.modified_at;
    }
  }
}

// ============================================================================
// Date helpers
// ============================================================================

/// Parse either a plain `YYYY-MM-DD` date or a full RFC 3339 timestamp.
pub fn parse_wire_date(s: &str) -> Option<NaiveDate> {
  let s = s.trim();
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
    .or_else(|| s.get(..10).and_then(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok()))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
  D: Deserializer<'de>,
{
  let s = String::deserialize(deserializer)?;
  parse_wire_date(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", s)))
}

fn deserialize_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
  D: Deserializer<'de>,
{
  let s: Option<String> = Option::deserialize(deserializer)?;
  match s {
    Some(s) if !s.trim().is_empty() => parse_wire_date(&s)
      .map(Some)
      .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", s))),
    _ => Ok(None),
  }
}

fn deserialize_some_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
  D: Deserializer<'de>,
{
  deserialize_opt_date(deserializer)
}

/// Distinguish an explicit `null` (`Some(None)`) from an absent field (`None`).
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  T: Deserialize<'de>,
  D: Deserializer<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}
