//! Request bodies for write endpoints and their schema checks.
//!
//! `validate()` runs before anything is sent; a failure is a precondition
//! error and the request never leaves the process.

use chrono::NaiveDate;
use serde::Serialize;

use super::types::TaskStatus;
use crate::error::PmError;

/// Log durations are entered in quarter hours.
pub const DURATION_STEP: f64 = 0.25;

fn require_text(field: &str, value: &str) -> Result<(), PmError> {
  if value.trim().is_empty() {
    return Err(PmError::invalid_field(field, "must not be empty"));
  }
  Ok(())
}

fn require_opt_text(field: &str, value: Option<&str>) -> Result<(), PmError> {
  match value {
    Some(v) => require_text(field, v),
    None => Ok(()),
  }
}

/// Check a duration is finite, non-negative and a multiple of 0.25h.
pub fn validate_duration(duration: f64) -> Result<(), PmError> {
  if !duration.is_finite() || duration < 0.0 {
    return Err(PmError::invalid_field("duration", "must be at least 0"));
  }
  let steps = duration / DURATION_STEP;
  if (steps - steps.round()).abs() > 1e-9 {
    return Err(PmError::invalid_field(
      "duration",
      "must be in increments of 0.25",
    ));
  }
  Ok(())
}

pub fn validate_id(entity: &str, id: &str) -> Result<(), PmError> {
  if id.trim().is_empty() {
    return Err(PmError::precondition(format!("Missing {} id", entity)));
  }
  Ok(())
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub pl: String,
}

impl NewProject {
  pub fn validate(&self) -> Result<(), PmError> {
    require_text("title", &self.title)?;
    require_text("pl", &self.pl)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEdit {
  #[serde(skip)]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pl: Option<String>,
}

impl ProjectEdit {
  pub fn validate(&self) -> Result<(), PmError> {
    validate_id("project", &self.id)?;
    require_opt_text("title", self.title.as_deref())?;
    require_opt_text("pl", self.pl.as_deref())
  }
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub project_id: Option<String>,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pl: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub jira_link: Option<String>,
  pub due_date: NaiveDate,
  pub status: TaskStatus,
}

impl NewTask {
  pub fn validate(&self) -> Result<(), PmError> {
    require_text("title", &self.title)?;
    if let Some(project_id) = &self.project_id {
      validate_id("project", project_id)?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEdit {
  #[serde(skip)]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub project_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pl: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub jira_link: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<TaskStatus>,
}

impl TaskEdit {
  pub fn validate(&self) -> Result<(), PmError> {
    validate_id("task", &self.id)?;
    require_opt_text("title", self.title.as_deref())
  }
}

// ============================================================================
// Events and logs
// ============================================================================

/// First log recorded together with a new event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialLog {
  pub title: String,
  pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
  pub title: String,
  pub day: NaiveDate,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub log: Option<InitialLog>,
}

impl NewEvent {
  pub fn validate(&self) -> Result<(), PmError> {
    require_text("title", &self.title)?;
    if let Some(task_id) = &self.task_id {
      validate_id("task", task_id)?;
    }
    if let Some(log) = &self.log {
      require_text("log title", &log.title)?;
      validate_duration(log.duration)?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEdit {
  #[serde(skip)]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
}

impl EventEdit {
  pub fn validate(&self) -> Result<(), PmError> {
    validate_id("event", &self.id)?;
    require_opt_text("title", self.title.as_deref())?;
    if let Some(task_id) = &self.task_id {
      validate_id("task", task_id)?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLog {
  pub event_id: String,
  pub title: String,
  pub duration: f64,
}

impl NewLog {
  pub fn validate(&self) -> Result<(), PmError> {
    validate_id("event", &self.event_id)?;
    require_text("title", &self.title)?;
    validate_duration(self.duration)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEdit {
  #[serde(skip)]
  pub id: String,
  pub event_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<f64>,
}

impl LogEdit {
  pub fn validate(&self) -> Result<(), PmError> {
    validate_id("log", &self.id)?;
    validate_id("event", &self.event_id)?;
    require_opt_text("title", self.title.as_deref())?;
    if let Some(duration) = self.duration {
      validate_duration(duration)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_duration_rules() {
    assert!(validate_duration(0.0).is_ok());
    assert!(validate_duration(0.25).is_ok());
    assert!(validate_duration(2.5).is_ok());
    assert!(validate_duration(0.3).is_err());
    assert!(validate_duration(-0.25).is_err());
    assert!(validate_duration(f64::NAN).is_err());
  }

  #[test]
  fn test_new_log_requires_title_and_event() {
    let log = NewLog {
      event_id: "E1".to_string(),
      title: "  ".to_string(),
      duration: 1.0,
    };
    assert!(log.validate().unwrap_err().is_precondition());

    let log = NewLog {
      event_id: String::new(),
      title: "Review".to_string(),
      duration: 1.0,
    };
    assert!(log.validate().is_err());
  }

  #[test]
  fn test_log_edit_body_omits_id() {
    let edit = LogEdit {
      id: "L1".to_string(),
      event_id: "E1".to_string(),
      title: None,
      duration: Some(1.0),
    };
    assert!(edit.validate().is_ok());
    assert_eq!(
      serde_json::to_value(&edit).unwrap(),
      serde_json::json!({ "eventId": "E1", "duration": 1.0 })
    );
  }

  #[test]
  fn test_new_event_checks_initial_log() {
    let event = NewEvent {
      title: "Standup".to_string(),
      day: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
      task_id: None,
      log: Some(InitialLog {
        title: "Standup".to_string(),
        duration: 0.1,
      }),
    };
    assert!(event.validate().is_err());
  }

  #[test]
  fn test_project_requires_lead() {
    let project = NewProject {
      title: "Website".to_string(),
      description: None,
      pl: String::new(),
    };
    assert_eq!(
      project.validate().unwrap_err().to_string(),
      "Invalid pl: must not be empty"
    );
  }
}
