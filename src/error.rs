//! Error taxonomy shared by the gateway, cache and mutation coordinator.

use std::fmt;

use crate::cache::QueryKey;

/// Errors surfaced to callers of the core.
///
/// The enum is `Clone` because a single in-flight fetch can have many
/// waiters, and each of them receives the same outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PmError {
  /// Missing or malformed credential, or an invalid mutation payload.
  /// Never reaches the network.
  #[error("{0}")]
  Precondition(String),

  /// Transport failure or non-2xx response.
  #[error("{message}")]
  Network {
    status: Option<u16>,
    message: String,
  },
}

impl PmError {
  pub fn precondition(message: impl Into<String>) -> Self {
    Self::Precondition(message.into())
  }

  pub fn invalid_field(field: &str, reason: &str) -> Self {
    Self::Precondition(format!("Invalid {}: {}", field, reason))
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::Network {
      status: None,
      message: message.into(),
    }
  }

  /// Build a network error from an HTTP status, preferring the server's
  /// message when it sent one.
  pub fn http(status: u16, server_message: Option<String>) -> Self {
    let message = server_message
      .filter(|m| !m.trim().is_empty())
      .unwrap_or_else(|| format!("HTTP error! status: {}", status));
    Self::Network {
      status: Some(status),
      message,
    }
  }

  pub fn is_precondition(&self) -> bool {
    matches!(self, Self::Precondition(_))
  }

  pub fn is_network(&self) -> bool {
    matches!(self, Self::Network { .. })
  }
}

/// A mutated entity could not be located in a cache entry that was expected
/// to hold it. Soft condition: logged, never returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationMiss {
  pub key: QueryKey,
  pub entity: &'static str,
  pub id: String,
}

impl fmt::Display for ReconciliationMiss {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} {} not found in {}",
      self.entity,
      self.id,
      self.key.description()
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_http_error_prefers_server_message() {
    let err = PmError::http(404, Some("Event not found".to_string()));
    assert_eq!(err.to_string(), "Event not found");
    assert!(err.is_network());
  }

  #[test]
  fn test_http_error_falls_back_to_status() {
    let err = PmError::http(502, Some("  ".to_string()));
    assert_eq!(err.to_string(), "HTTP error! status: 502");

    let err = PmError::http(500, None);
    assert_eq!(err.to_string(), "HTTP error! status: 500");
  }
}
