//! Client-side derivations over cached data.
//!
//! Sort order and free-text narrowing of task listings are applied here
//! rather than on the backend, so they never take part in a cache key.

use chrono::NaiveDate;
use std::cmp::Ordering;

use crate::api::types::{Day, Project, Task};

/// Sort orders offered on task listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskSort {
  /// Server order
  #[default]
  None,
  Title,
  Newest,
  Updated,
  DueDate,
  Lead,
}

impl TaskSort {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim() {
      "" => Some(TaskSort::None),
      "title" => Some(TaskSort::Title),
      "newest" => Some(TaskSort::Newest),
      "updated" => Some(TaskSort::Updated),
      "due-date" => Some(TaskSort::DueDate),
      "pl" => Some(TaskSort::Lead),
      _ => None,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      TaskSort::None => "None",
      TaskSort::Title => "Title",
      TaskSort::Newest => "Newest",
      TaskSort::Updated => "Recently updated",
      TaskSort::DueDate => "Due date",
      TaskSort::Lead => "Lead",
    }
  }

  fn compare(&self, a: &Task, b: &Task) -> Ordering {
    match self {
      TaskSort::None => Ordering::Equal,
      TaskSort::Title => a.title.cmp(&b.title),
      TaskSort::Newest => b.created_at.cmp(&a.created_at),
      TaskSort::Updated => {
        let touched = |t: &Task| t.modified_at.or(t.created_at);
        touched(b).cmp(&touched(a))
      }
      // Missing due dates count as far future and sort first
      TaskSort::DueDate => {
        let due = |t: &Task| t.due_date.unwrap_or(NaiveDate::MAX);
        due(b).cmp(&due(a))
      }
      TaskSort::Lead => a.pl.as_deref().unwrap_or("").cmp(b.pl.as_deref().unwrap_or("")),
    }
  }
}

/// Whether `task` mentions `needle` in its title, description or lead.
pub fn task_matches_text(task: &Task, needle: &str) -> bool {
  let needle = needle.trim().to_lowercase();
  if needle.is_empty() {
    return true;
  }
  let contains = |s: &str| s.to_lowercase().contains(&needle);
  contains(&task.title)
    || task.description.as_deref().is_some_and(contains)
    || task.pl.as_deref().is_some_and(contains)
}

/// Narrow by free text, then sort. The sort is stable.
pub fn sort_and_filter_tasks<'a>(tasks: &'a [Task], search: &str, sort: TaskSort) -> Vec<&'a Task> {
  let mut result: Vec<&Task> = tasks.iter().filter(|t| task_matches_text(t, search)).collect();
  result.sort_by(|a, b| sort.compare(a, b));
  result
}

/// Hours booked across several days.
pub fn total_hours(days: &[Day]) -> f64 {
  days.iter().map(Day::worked_hours).sum()
}

/// Share of a project's tasks that are done, `0.0..=1.0`.
pub fn project_progress(project: &Project) -> f64 {
  let total = project.upcoming_tasks + project.in_progress_tasks + project.done_tasks;
  if total == 0 {
    return 0.0;
  }
  f64::from(project.done_tasks) / f64::from(total)
}
