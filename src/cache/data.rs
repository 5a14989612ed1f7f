//! Typed payload stored in a cache entry.

use serde_json::Value;

use super::key::QueryKey;
use crate::api::api_types::ApiResponse;
use crate::api::types::{Day, Event, Log, Project, Stat, Task};
use crate::error::PmError;

/// One page of results with the envelope's pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
  pub results: Vec<T>,
  pub limit: Option<u64>,
  pub offset: Option<u64>,
  pub total_results: Option<u64>,
}

impl<T> Page<T> {
  pub fn new(results: Vec<T>) -> Self {
    let total = results.len() as u64;
    Self {
      results,
      limit: None,
      offset: None,
      total_results: Some(total),
    }
  }

  /// Whether appending to this page would break its pagination window.
  pub fn is_window_closed(&self) -> bool {
    self.offset.unwrap_or(0) > 0
      || self
        .limit
        .is_some_and(|limit| self.results.len() as u64 >= limit)
  }

  pub fn bump_total(&mut self, delta: i64) {
    if let Some(total) = self.total_results.as_mut() {
      *total = total.saturating_add_signed(delta);
    }
  }
}

impl<T> From<ApiResponse<T>> for Page<T> {
  fn from(response: ApiResponse<T>) -> Self {
    Self {
      results: response.results,
      limit: response.limit,
      offset: response.offset,
      total_results: response.total_results,
    }
  }
}

/// Data held under a query key. The variant is fixed by the key's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
  Days(Page<Day>),
  Stats(Page<Stat>),
  Events(Page<Event>),
  Tasks(Page<Task>),
  Projects(Page<Project>),
}

impl QueryData {
  /// Decode an envelope into the variant `key` stores.
  pub fn decode(key: &QueryKey, response: ApiResponse<Value>) -> Result<Self, PmError> {
    let data = match key {
      QueryKey::DayRange { .. } | QueryKey::Day { .. } => {
        let mut page: Page<Day> = response.decode::<Day>()?.into();
        page.results.iter_mut().for_each(Day::adopt_events);
        QueryData::Days(page)
      }
      QueryKey::Stats { .. } => {
        let mut page: Page<Stat> = response.decode::<Stat>()?.into();
        page.results.iter_mut().for_each(Stat::adopt_events);
        QueryData::Stats(page)
      }
      QueryKey::Events { .. } => QueryData::Events(response.decode::<Event>()?.into()),
      QueryKey::Tasks(_) | QueryKey::Task { .. } | QueryKey::TaskSearch { .. } => {
        QueryData::Tasks(response.decode::<Task>()?.into())
      }
      QueryKey::Projects | QueryKey::Project { .. } => {
        QueryData::Projects(response.decode::<Project>()?.into())
      }
    };
    Ok(data)
  }

  /// Empty data of the right variant, for disabled queries.
  pub fn empty(key: &QueryKey) -> Self {
    match key {
      QueryKey::DayRange { .. } | QueryKey::Day { .. } => QueryData::Days(Page::new(Vec::new())),
      QueryKey::Stats { .. } => QueryData::Stats(Page::new(Vec::new())),
      QueryKey::Events { .. } => QueryData::Events(Page::new(Vec::new())),
      QueryKey::Tasks(_) | QueryKey::Task { .. } | QueryKey::TaskSearch { .. } => {
        QueryData::Tasks(Page::new(Vec::new()))
      }
      QueryKey::Projects | QueryKey::Project { .. } => QueryData::Projects(Page::new(Vec::new())),
    }
  }

  pub fn days(&self) -> Option<&[Day]> {
    match self {
      QueryData::Days(page) => Some(&page.results),
      _ => None,
    }
  }

  pub fn stats(&self) -> Option<&[Stat]> {
    match self {
      QueryData::Stats(page) => Some(&page.results),
      _ => None,
    }
  }

  pub fn events(&self) -> Option<&[Event]> {
    match self {
      QueryData::Events(page) => Some(&page.results),
      _ => None,
    }
  }

  pub fn tasks(&self) -> Option<&[Task]> {
    match self {
      QueryData::Tasks(page) => Some(&page.results),
      _ => None,
    }
  }

  pub fn projects(&self) -> Option<&[Project]> {
    match self {
      QueryData::Projects(page) => Some(&page.results),
      _ => None,
    }
  }

  /// Find an event wherever this data holds events, nested or flat.
  pub fn find_event(&self, id: &str) -> Option<&Event> {
    match self {
      QueryData::Days(page) => page.results.iter().find_map(|d| d.event(id)),
      QueryData::Stats(page) => page
        .results
        .iter()
        .find_map(|s| s.events.iter().find(|e| e.id == id)),
      QueryData::Events(page) => page.results.iter().find(|e| e.id == id),
      _ => None,
    }
  }

  pub fn find_log(&self, event_id: &str, log_id: &str) -> Option<&Log> {
    self.find_event(event_id).and_then(|e| e.log(log_id))
  }

  pub fn len(&self) -> usize {
    match self {
      QueryData::Days(p) => p.results.len(),
      QueryData::Stats(p) => p.results.len(),
      QueryData::Events(p) => p.results.len(),
      QueryData::Tasks(p) => p.results.len(),
      QueryData::Projects(p) => p.results.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testing::{day_json, envelope, event_json, log_json};
  use chrono::NaiveDate;
  use serde_json::json;

  #[test]
  fn test_decode_nested_days() {
    let key = QueryKey::day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    let response = envelope(vec![day_json(
      "D1",
      "2024-03-01",
      vec![event_json("E1", "Standup", "2024-03-01", vec![log_json("L1", "E1", 0.5)])],
    )]);

    let data = QueryData::decode(&key, response).unwrap();
    assert_eq!(data.days().map(|d| d.len()), Some(1));
    assert_eq!(data.find_log("E1", "L1").map(|l| l.duration), Some(0.5));
    assert!(data.find_event("E2").is_none());
  }

  #[test]
  fn test_decode_fills_day_of_nested_events() {
    let key = QueryKey::day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    let response = envelope(vec![json!({
      "id": "D1",
      "workingDate": "2024-03-01",
      "events": [{ "id": "E1", "title": "Standup", "dayId": "D1", "logs": [] }]
    })]);

    let data = QueryData::decode(&key, response).unwrap();
    let event = data.find_event("E1").unwrap();
    assert_eq!(event.day, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert_eq!(event.day_id.as_deref(), Some("D1"));
  }

  #[test]
  fn test_decode_stats() {
    let key = QueryKey::stats(NaiveDate::from_ymd_opt(2024, 3, 1), NaiveDate::from_ymd_opt(2024, 3, 7));
    let response = envelope(vec![json!({
      "day": "2024-03-04",
      "events": [event_json("E1", "Standup", "2024-03-04", vec![log_json("L1", "E1", 0.5)])]
    })]);

    let data = QueryData::decode(&key, response).unwrap();
    assert_eq!(data.stats().map(|s| s.len()), Some(1));
    assert_eq!(data.find_log("E1", "L1").map(|l| l.duration), Some(0.5));
  }

  #[test]
  fn test_window_closed() {
    let mut page = Page::new(vec![1, 2]);
    assert!(!page.is_window_closed());
    page.limit = Some(2);
    assert!(page.is_window_closed());
    page.limit = Some(10);
    page.offset = Some(10);
    assert!(page.is_window_closed());
  }

  #[test]
  fn test_bump_total_saturates() {
    let mut page = Page::new(Vec::<u8>::new());
    page.bump_total(-1);
    assert_eq!(page.total_results, Some(0));
    page.bump_total(2);
    assert_eq!(page.total_results, Some(2));
  }
}
