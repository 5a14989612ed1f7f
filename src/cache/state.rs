//! Entry status and the read-only view handed to callers.

use std::sync::Arc;
use std::time::Instant;

use super::data::QueryData;
use crate::error::PmError;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Never fetched, or the query is disabled
  Idle,
  /// A fetch is in flight
  Pending,
  /// Last fetch succeeded
  Success,
  /// Last fetch failed; data (if any) is from an earlier success
  Error,
}

/// Immutable view of one cache entry at the time of the read.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
  /// Last good data. Survives failed refetches.
  pub data: Option<Arc<QueryData>>,
  pub status: QueryStatus,
  pub error: Option<PmError>,
  /// When `data` was last fetched from the backend
  pub fetched_at: Option<Instant>,
  /// Whether the entry is past its stale time or was invalidated
  pub is_stale: bool,
}

impl QuerySnapshot {
  pub fn idle() -> Self {
    Self {
      data: None,
      status: QueryStatus::Idle,
      error: None,
      fetched_at: None,
      is_stale: true,
    }
  }

  /// Pending with nothing to show yet.
  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Pending && self.data.is_none()
  }

  /// Any fetch in flight, including background refetches.
  pub fn is_fetching(&self) -> bool {
    self.status == QueryStatus::Pending
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn data(&self) -> Option<&QueryData> {
    self.data.as_deref()
  }

  pub fn error_message(&self) -> Option<String> {
    self.error.as_ref().map(|e| e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_background_refetch_is_not_loading() {
    let snapshot = QuerySnapshot {
      data: Some(Arc::new(QueryData::Projects(super::super::data::Page::new(Vec::new())))),
      status: QueryStatus::Pending,
      error: None,
      fetched_at: Some(Instant::now()),
      is_stale: true,
    };
    assert!(!snapshot.is_loading());
    assert!(snapshot.is_fetching());
  }

  #[test]
  fn test_idle_snapshot() {
    let snapshot = QuerySnapshot::idle();
    assert!(!snapshot.is_loading());
    assert!(!snapshot.is_error());
    assert!(snapshot.data().is_none());
  }
}
