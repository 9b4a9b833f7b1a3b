//! Task record structure and related functionality.
//!
//! This module defines the core `Task` record with its schedule, status and
//! relationship fields, plus the nested collections it carries (assigned
//! workers, dependencies, comments, attachments).
//!
//! Records deserialise leniently: every field is optional at the serde
//! level, so documents that fail validation can still be loaded, reported
//! on and repaired rather than discarded. Canonical typed views come from
//! the accessor methods; the validator decides what is acceptable.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::{TaskPriority, TaskStatus};

/// A single unit of tracked work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub task_id: Option<u64>,
    pub task_name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub progress_percentage: Option<f64>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub is_critical_path: Option<bool>,
    pub category_name: Option<String>,
    pub parent_task_id: Option<u64>,
    pub creator_id: Option<String>,
    pub created_date: Option<String>,
    pub completed_date: Option<String>,
    pub tags: Vec<String>,
    pub assigned_workers: Vec<AssignedWorker>,
    pub dependencies: Vec<Dependency>,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
}

impl Task {
    /// Canonical status, if the stored string is recognisable.
    pub fn status_enum(&self) -> Option<TaskStatus> {
        self.status.as_deref().and_then(TaskStatus::parse)
    }

    /// Canonical priority, if the stored string is recognisable.
    pub fn priority_enum(&self) -> Option<TaskPriority> {
        self.priority.as_deref().and_then(TaskPriority::parse)
    }

    pub fn is_completed(&self) -> bool {
        self.status_enum() == Some(TaskStatus::Completed)
    }

    /// Parsed start date, if present and well-formed.
    pub fn start(&self) -> Option<NaiveDate> {
        parse_iso_date(self.start_date.as_deref()?)
    }

    /// Parsed end date, if present and well-formed.
    pub fn end(&self) -> Option<NaiveDate> {
        parse_iso_date(self.end_date.as_deref()?)
    }

    /// Round-trip through a JSON object for validation and patch merging.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: Value) -> Result<Task, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date. The shape check rejects
/// unpadded components that chrono would otherwise accept.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// A worker assignment carried on a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignedWorker {
    pub name: String,
    pub email: String,
    pub role: String,
}

/// A scheduling dependency on another task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dependency {
    pub predecessor: Predecessor,
    pub dependency_type: String,
    pub lag_days: i64,
}

/// Reference to a predecessor task: a numeric identifier where known,
/// otherwise a name to be resolved against the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predecessor {
    Id(u64),
    Name(String),
}

impl Default for Predecessor {
    fn default() -> Self {
        Predecessor::Name(String::new())
    }
}

impl fmt::Display for Predecessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predecessor::Id(id) => write!(f, "{id}"),
            Predecessor::Name(name) => write!(f, "{name}"),
        }
    }
}

impl Predecessor {
    /// A token that is all digits is an identifier; anything else a name.
    pub fn parse(token: &str) -> Predecessor {
        let token = token.trim();
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            match token.parse::<u64>() {
                Ok(id) => Predecessor::Id(id),
                Err(_) => Predecessor::Name(token.to_string()),
            }
        } else {
            Predecessor::Name(token.to_string())
        }
    }
}

/// A discussion entry attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub author: String,
    pub timestamp: String,
    pub text: String,
}

/// A file reference attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub uploaded_by: String,
    pub upload_date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_deserialisation() {
        let task: Task = serde_json::from_str(r#"{"task_name": "Wire up login"}"#).unwrap();
        assert_eq!(task.task_name.as_deref(), Some("Wire up login"));
        assert_eq!(task.task_id, None);
        assert!(task.tags.is_empty());
    }

    #[test]
    fn test_status_accessor_normalises() {
        let task = Task {
            status: Some("in_progress".into()),
            ..Task::default()
        };
        assert_eq!(task.status_enum(), Some(TaskStatus::InProgress));
        assert!(!task.is_completed());
    }

    #[test]
    fn test_predecessor_token_parsing() {
        assert_eq!(Predecessor::parse("42"), Predecessor::Id(42));
        assert_eq!(
            Predecessor::parse("Design review"),
            Predecessor::Name("Design review".into())
        );
        assert_eq!(Predecessor::parse(""), Predecessor::Name(String::new()));
    }

    #[test]
    fn test_predecessor_serialises_untagged() {
        let dep = Dependency {
            predecessor: Predecessor::Id(7),
            dependency_type: "FS".into(),
            lag_days: 2,
        };
        let value = serde_json::to_value(&dep).unwrap();
        assert_eq!(value["predecessor"], serde_json::json!(7));

        let back: Dependency = serde_json::from_value(value).unwrap();
        assert_eq!(back.predecessor, Predecessor::Id(7));
    }

    #[test]
    fn test_strict_date_parsing() {
        assert!(parse_iso_date("2026-02-14").is_some());
        assert!(parse_iso_date("2026-02-30").is_none());
        assert!(parse_iso_date("2026-2-14").is_none());
        assert!(parse_iso_date("14/02/2026").is_none());
        assert!(parse_iso_date("").is_none());
    }
}
