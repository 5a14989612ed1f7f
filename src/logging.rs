//! Subscriber setup for the binary.
//!
//! Filtering follows `TALLYBOOK_LOG` (same syntax as `RUST_LOG`), falling
//! back to `info` for this crate and `warn` for everything else.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "TALLYBOOK_LOG";

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
  Stderr,
  /// Daily rolling file in the given directory
  Dir(PathBuf),
}

impl LogTarget {
  /// `$XDG_DATA_HOME/tallybook`, or the working directory when unknown.
  pub fn default_dir() -> Self {
    let dir = dirs::data_dir()
      .map(|d| d.join("tallybook"))
      .unwrap_or_else(|| PathBuf::from("."));
    LogTarget::Dir(dir)
  }
}

fn filter() -> EnvFilter {
  match std::env::var(LOG_ENV) {
    Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
    _ => EnvFilter::new("warn,tallybook=info"),
  }
}

/// Install the global subscriber. Keep the guard alive until exit or
/// buffered lines are lost.
pub fn init(target: &LogTarget) -> Result<WorkerGuard> {
  let (writer, guard) = match target {
    LogTarget::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    LogTarget::Dir(dir) => {
      ensure_dir(dir)?;
      tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "tallybook.log"))
    }
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter())
    .with_writer(writer)
    .with_ansi(matches!(target, LogTarget::Stderr))
    .try_init()
    .map_err(|e| eyre!("Failed to initialise logging: {}", e))?;

  Ok(guard)
}

fn ensure_dir(dir: &Path) -> Result<()> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_dir_is_namespaced() {
    match LogTarget::default_dir() {
      LogTarget::Dir(dir) => assert!(dir.ends_with("tallybook") || dir == Path::new(".")),
      LogTarget::Stderr => panic!("expected a directory"),
    }
  }
}
