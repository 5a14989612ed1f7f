//! Structural cache keys derived from the current filter context.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::api::types::{parse_wire_date, Task, TaskStatus};

/// Task searches shorter than this never hit the backend.
pub const MIN_SEARCH_LEN: usize = 3;

/// Free-text search as the user typed it, trimmed.
///
/// Two texts differing only in case are the same query: they compare and
/// hash equal. The backend still receives the text unchanged.
#[derive(Clone, Debug, Default)]
pub struct SearchText(String);

impl SearchText {
  pub fn new(text: &str) -> Self {
    Self(text.trim().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn folded(&self) -> String {
    self.0.to_lowercase()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl PartialEq for SearchText {
  fn eq(&self, other: &Self) -> bool {
    self.folded() == other.folded()
  }
}

impl Eq for SearchText {}

impl Hash for SearchText {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.folded().hash(state);
  }
}

impl fmt::Display for SearchText {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Filters for task listings.
///
/// Text fields are normalised on construction: trimmed, and blank values
/// collapse to `None` because the backend receives no parameter either way.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TaskFilter {
  pub project_id: Option<String>,
  pub status: Option<TaskStatus>,
  pub limit: Option<u32>,
  pub offset: Option<u32>,
  pub lead: Option<String>,
  pub search: Option<SearchText>,
}

impl TaskFilter {
  /// Build a filter from loose `(name, value)` parameters, in any order.
  /// Unknown names and unparseable values are ignored.
  pub fn from_params<'a, I>(params: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let mut filter = TaskFilter::default();
    for (name, value) in params {
      match name {
        "projectId" | "project_id" | "project" => filter.project_id = Some(value.to_string()),
        "status" => filter.status = TaskStatus::parse(value),
        "limit" => filter.limit = value.trim().parse().ok(),
        "offset" => filter.offset = value.trim().parse().ok(),
        "lead" | "pl" => filter.lead = Some(value.to_string()),
        "search" | "q" => filter.search = Some(SearchText::new(value)),
        _ => {}
      }
    }
    filter.normalized()
  }

  /// Whether `task` satisfies every filter that can be evaluated locally.
  /// Pagination is not a filter and is ignored here.
  pub fn matches(&self, task: &Task) -> bool {
    let project_ok = self
      .project_id
      .as_ref()
      .map_or(true, |p| task.project_id.as_ref() == Some(p));
    let status_ok = self.status.map_or(true, |s| task.status == s);
    let lead_ok = self.lead.as_ref().map_or(true, |lead| {
      task
        .pl
        .as_deref()
        .is_some_and(|pl| pl.eq_ignore_ascii_case(lead))
    });
    let search_ok = self.search.as_ref().map_or(true, |q| {
      let q = q.folded();
      let contains = |s: Option<&str>| s.is_some_and(|s| s.to_lowercase().contains(q.as_str()));
      contains(Some(&task.title)) || contains(task.description.as_deref()) || contains(task.pl.as_deref())
    });
    project_ok && status_ok && lead_ok && search_ok
  }

  pub fn normalized(self) -> Self {
    Self {
      project_id: normalize_text(self.project_id),
      status: self.status,
      limit: self.limit,
      offset: self.offset.filter(|o| *o > 0),
      lead: normalize_text(self.lead),
      search: self
        .search
        .map(|s| SearchText::new(s.as_str()))
        .filter(|s| !s.is_empty()),
    }
  }
}

/// Cache key for one logical backend read.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
  /// Days (with nested events) within an inclusive date range
  DayRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
  },
  /// A single day with nested events
  Day { date: NaiveDate },
  /// Per-day statistics with nested events, within an inclusive date range
  Stats {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
  },
  /// Flat event listing
  Events {
    day: Option<NaiveDate>,
    task_id: Option<String>,
  },
  /// Task listing
  Tasks(TaskFilter),
  /// A single task
  Task { id: String },
  /// Free-text task search used when attaching an event to a task
  TaskSearch { q: SearchText },
  /// All projects
  Projects,
  /// A single project
  Project { id: String },
}

impl QueryKey {
  pub fn day_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
    Self::DayRange { start, end }
  }

  pub fn day(date: NaiveDate) -> Self {
    Self::Day { date }
  }

  pub fn stats(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
    Self::Stats { start, end }
  }

  pub fn events(day: Option<NaiveDate>, task_id: Option<&str>) -> Self {
    Self::Events {
      day,
      task_id: normalize_text(task_id.map(String::from)),
    }
  }

  pub fn tasks(filter: TaskFilter) -> Self {
    Self::Tasks(filter.normalized())
  }

  pub fn task(id: &str) -> Self {
    Self::Task { id: id.trim().to_string() }
  }

  pub fn task_search(q: &str) -> Self {
    Self::TaskSearch {
      q: SearchText::new(q),
    }
  }

  pub fn project(id: &str) -> Self {
    Self::Project { id: id.trim().to_string() }
  }

  /// Build an event-view key from loose URL-style parameters, in any order.
  ///
  /// `start`/`end` select the day-range view, `day` alone the single-day
  /// view, and `taskId` (with or without `day`) the flat listing.
  pub fn events_from_params<'a, I>(params: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let mut day = None;
    let mut task_id = None;
    let mut start = None;
    let mut end = None;
    for (name, value) in params {
      match name {
        "day" => day = parse_wire_date(value),
        "taskId" | "task_id" => task_id = normalize_text(Some(value.to_string())),
        "start" => start = parse_wire_date(value),
        "end" => end = parse_wire_date(value),
        _ => {}
      }
    }

    match (task_id, day) {
      (Some(task_id), day) => Self::Events {
        day,
        task_id: Some(task_id),
      },
      (None, Some(date)) => Self::Day { date },
      (None, None) => Self::DayRange { start, end },
    }
  }

  /// Whether this key may be fetched at all.
  pub fn is_enabled(&self) -> bool {
    match self {
      Self::TaskSearch { q } => q.as_str().chars().count() >= MIN_SEARCH_LEN,
      _ => true,
    }
  }

  /// Query-string parameters sent to the backend, in a fixed order.
  pub fn query_pairs(&self) -> Vec<(String, String)> {
    self.pairs(false)
  }

  /// Parameters with search text case-folded when `fold` is set.
  fn pairs(&self, fold: bool) -> Vec<(String, String)> {
    let search = |s: &SearchText| if fold { s.folded() } else { s.as_str().to_string() };
    let mut pairs = Vec::new();
    let mut push = |name: &str, value: Option<String>| {
      if let Some(v) = value {
        pairs.push((name.to_string(), v));
      }
    };

    match self {
      Self::DayRange { start, end } | Self::Stats { start, end } => {
        push("start", start.map(format_date));
        push("end", end.map(format_date));
      }
      Self::Day { date } => push("day", Some(format_date(*date))),
      Self::Events { day, task_id } => {
        push("day", day.map(format_date));
        push("taskId", task_id.clone());
      }
      Self::Tasks(filter) => {
        push("projectId", filter.project_id.clone());
        push("status", filter.status.map(|s| s.as_str().to_string()));
        push("limit", filter.limit.map(|l| l.to_string()));
        push("offset", filter.offset.map(|o| o.to_string()));
        push("lead", filter.lead.clone());
        push("search", filter.search.as_ref().map(search));
      }
      Self::TaskSearch { q } => push("q", Some(search(q))),
      Self::Task { .. } | Self::Projects | Self::Project { .. } => {}
    }

    pairs
  }

  /// Canonical text form, stable across runs.
  fn canonical(&self) -> String {
    let kind = match self {
      Self::DayRange { .. } => "day_range",
      Self::Day { .. } => "day",
      Self::Stats { .. } => "stats",
      Self::Events { .. } => "events",
      Self::Tasks(_) => "tasks",
      Self::Task { id } => return format!("task:{}", id),
      Self::TaskSearch { .. } => "task_search",
      Self::Projects => "projects",
      Self::Project { id } => return format!("project:{}", id),
    };
    let params: Vec<String> = self
      .pairs(true)
      .into_iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect();
    format!("{}:{}", kind, params.join("&"))
  }

  /// SHA256 hash of the canonical form, for logs and persistent references.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    match self {
      Self::DayRange { start, end } => match (start, end) {
        (Some(s), Some(e)) => format!("days {}..{}", s, e),
        (Some(s), None) => format!("days from {}", s),
        (None, Some(e)) => format!("days until {}", e),
        (None, None) => "all days".to_string(),
      },
      Self::Day { date } => format!("day {}", date),
      Self::Stats { start, end } => match (start, end) {
        (Some(s), Some(e)) => format!("stats {}..{}", s, e),
        (Some(s), None) => format!("stats from {}", s),
        (None, Some(e)) => format!("stats until {}", e),
        (None, None) => "all stats".to_string(),
      },
      Self::Events { day, task_id } => match (day, task_id) {
        (Some(d), Some(t)) => format!("events on {} for task {}", d, t),
        (Some(d), None) => format!("events on {}", d),
        (None, Some(t)) => format!("events for task {}", t),
        (None, None) => "all events".to_string(),
      },
      Self::Tasks(filter) => {
        let params = self.query_pairs();
        if params.is_empty() && filter == &TaskFilter::default() {
          "all tasks".to_string()
        } else {
          let params: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
          format!("tasks ({})", params.join(", "))
        }
      }
      Self::Task { id } => format!("task {}", id),
      Self::TaskSearch { q } => format!("task search '{}'", q),
      Self::Projects => "all projects".to_string(),
      Self::Project { id } => format!("project {}", id),
    }
  }

  /// Whether the key's date criteria cover `date`.
  pub fn covers_day(&self, date: NaiveDate) -> bool {
    match self {
      Self::DayRange { start, end } | Self::Stats { start, end } => {
        start.map_or(true, |s| s <= date) && end.map_or(true, |e| date <= e)
      }
      Self::Day { date: d } => *d == date,
      Self::Events { day, .. } => day.map_or(true, |d| d == date),
      _ => false,
    }
  }

  /// Keys whose data nests events under days.
  pub fn is_day_view(&self) -> bool {
    matches!(
      self,
      Self::DayRange { .. } | Self::Day { .. } | Self::Stats { .. }
    )
  }
}

fn normalize_text(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

fn format_date(date: NaiveDate) -> String {
  date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  #[test]
  fn test_param_order_does_not_matter() {
    let a = TaskFilter::from_params([("status", "done"), ("projectId", "P1"), ("search", "Bug")]);
    let b = TaskFilter::from_params([("search", "bug "), ("projectId", "P1"), ("status", "done")]);
    assert_eq!(QueryKey::tasks(a.clone()), QueryKey::tasks(b));
    assert_eq!(
      QueryKey::tasks(a.clone()).cache_hash(),
      QueryKey::tasks(a).cache_hash()
    );
  }

  #[test]
  fn test_blank_collapses_to_absent() {
    let explicit_empty = TaskFilter::from_params([("projectId", ""), ("lead", "  ")]);
    assert_eq!(
      QueryKey::tasks(explicit_empty),
      QueryKey::tasks(TaskFilter::default())
    );
    assert_eq!(QueryKey::events(None, Some("")), QueryKey::events(None, None));
  }

  #[test]
  fn test_zero_offset_is_default_offset() {
    let a = TaskFilter::from_params([("offset", "0"), ("limit", "20")]);
    let b = TaskFilter::from_params([("limit", "20")]);
    assert_eq!(QueryKey::tasks(a), QueryKey::tasks(b));
  }

  #[test]
  fn test_distinct_filters_produce_distinct_keys() {
    let done = QueryKey::tasks(TaskFilter::from_params([("status", "done")]));
    let upcoming = QueryKey::tasks(TaskFilter::from_params([("status", "upcoming")]));
    assert_ne!(done, upcoming);
    assert_ne!(done.cache_hash(), upcoming.cache_hash());
    assert_eq!(done.cache_hash().len(), 64);
  }

  #[test]
  fn test_events_from_params_picks_view() {
    assert_eq!(
      QueryKey::events_from_params([("day", "2024-03-01")]),
      QueryKey::day(date("2024-03-01"))
    );
    assert_eq!(
      QueryKey::events_from_params([("taskId", "T1"), ("day", "2024-03-01")]),
      QueryKey::events_from_params([("day", "2024-03-01"), ("taskId", "T1")]),
    );
    assert_eq!(
      QueryKey::events_from_params([("end", "2024-03-31"), ("start", "2024-03-01")]),
      QueryKey::day_range(Some(date("2024-03-01")), Some(date("2024-03-31")))
    );
  }

  #[test]
  fn test_covers_day() {
    let march = QueryKey::day_range(Some(date("2024-03-01")), Some(date("2024-03-31")));
    assert!(march.covers_day(date("2024-03-01")));
    assert!(march.covers_day(date("2024-03-31")));
    assert!(!march.covers_day(date("2024-04-01")));

    let open = QueryKey::day_range(None, Some(date("2024-03-31")));
    assert!(open.covers_day(date("2020-01-01")));

    assert!(!QueryKey::Projects.covers_day(date("2024-03-01")));
  }

  #[test]
  fn test_short_search_is_disabled() {
    assert!(!QueryKey::task_search(" ab ").is_enabled());
    assert!(QueryKey::task_search("abc").is_enabled());
  }

  #[test]
  fn test_filter_matches_task() {
    let task = Task {
      id: "T1".to_string(),
      project_id: Some("P1".to_string()),
      title: "Fix login Bug".to_string(),
      description: None,
      pl: Some("Ada".to_string()),
      jira_link: None,
      due_date: None,
      status: TaskStatus::InProgress,
      created_at: None,
      modified_at: None,
    };

    assert!(TaskFilter::from_params([("search", "BUG"), ("projectId", "P1")]).matches(&task));
    assert!(TaskFilter::from_params([("lead", "ada")]).matches(&task));
    assert!(!TaskFilter::from_params([("status", "done")]).matches(&task));
    assert!(!TaskFilter::from_params([("projectId", "P2")]).matches(&task));
    assert!(!TaskFilter::from_params([("search", "signup")]).matches(&task));
  }

  #[test]
  fn test_search_case_only_affects_identity() {
    let lower = QueryKey::task_search("fix bug");
    let mixed = QueryKey::task_search("  Fix Bug ");
    assert_eq!(lower, mixed);
    assert_eq!(lower.cache_hash(), mixed.cache_hash());
    assert_eq!(
      mixed.query_pairs(),
      vec![("q".to_string(), "Fix Bug".to_string())]
    );

    let filter = TaskFilter::from_params([("search", " Login ")]);
    assert_eq!(
      QueryKey::tasks(filter.clone()).query_pairs(),
      vec![("search".to_string(), "Login".to_string())]
    );
    assert_eq!(
      QueryKey::tasks(filter),
      QueryKey::tasks(TaskFilter::from_params([("search", "login")]))
    );
  }

  #[test]
  fn test_stats_key_covers_its_range() {
    let week = QueryKey::stats(Some(date("2024-02-26")), Some(date("2024-03-03")));
    assert!(week.is_day_view());
    assert!(week.covers_day(date("2024-03-01")));
    assert_ne!(
      week,
      QueryKey::day_range(Some(date("2024-02-26")), Some(date("2024-03-03")))
    );
    assert_ne!(
      week.cache_hash(),
      QueryKey::day_range(Some(date("2024-02-26")), Some(date("2024-03-03"))).cache_hash()
    );
  }

  #[test]
  fn test_description() {
    assert_eq!(QueryKey::day(date("2024-03-01")).description(), "day 2024-03-01");
    assert_eq!(
      QueryKey::tasks(TaskFilter::default()).description(),
      "all tasks"
    );
  }
}
