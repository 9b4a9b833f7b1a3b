//! Enumerations and shared field metadata for task records.
//!
//! This module defines the status, priority and dependency vocabularies,
//! plus the declared required/optional field tables and the fixed CSV column
//! orders. The validator, the automation engine and the CSV codec all read
//! these tables, so the three stay aligned by construction.

use clap::ValueEnum;

/// Lifecycle status values a task record can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    OnHold,
    Blocked,
    Completed,
    Cancelled,
    PendingReview,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::OnHold,
        TaskStatus::Blocked,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
        TaskStatus::PendingReview,
    ];

    /// Canonical label as persisted in documents.
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::OnHold => "On Hold",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Completed => "Completed",
            TaskStatus::Cancelled => "Cancelled",
            TaskStatus::PendingReview => "Pending Review",
        }
    }

    /// File-name slug used for per-status projection documents.
    pub fn slug(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::OnHold => "on_hold",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::PendingReview => "pending_review",
        }
    }

    /// Parse a status string leniently: case-insensitive, with `_` and
    /// space interchangeable, so `in_progress`, `in progress` and
    /// `IN PROGRESS` all resolve to `InProgress`.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match normalise_token(s).as_str() {
            "not started" => Some(TaskStatus::NotStarted),
            "in progress" => Some(TaskStatus::InProgress),
            "on hold" => Some(TaskStatus::OnHold),
            "blocked" => Some(TaskStatus::Blocked),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            "pending review" => Some(TaskStatus::PendingReview),
            _ => None,
        }
    }
}

/// Priority classification for task importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::Critical,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
            TaskPriority::Critical => "Critical",
        }
    }

    /// Parse a priority string with the same lenient rules as statuses.
    pub fn parse(s: &str) -> Option<TaskPriority> {
        match normalise_token(s).as_str() {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "critical" => Some(TaskPriority::Critical),
            _ => None,
        }
    }
}

/// Lifecycle status values for the project record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    NotStarted,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 5] = [
        ProjectStatus::NotStarted,
        ProjectStatus::InProgress,
        ProjectStatus::OnHold,
        ProjectStatus::Completed,
        ProjectStatus::Cancelled,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProjectStatus::NotStarted => "Not Started",
            ProjectStatus::InProgress => "In Progress",
            ProjectStatus::OnHold => "On Hold",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<ProjectStatus> {
        match normalise_token(s).as_str() {
            "not started" => Some(ProjectStatus::NotStarted),
            "in progress" => Some(ProjectStatus::InProgress),
            "on hold" => Some(ProjectStatus::OnHold),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }
}

/// Scheduling relationship between a task and its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    FinishToStart,
    StartToStart,
    FinishToFinish,
    StartToFinish,
}

impl DependencyKind {
    /// Two-letter code used in documents and CSV cells.
    pub fn code(self) -> &'static str {
        match self {
            DependencyKind::FinishToStart => "FS",
            DependencyKind::StartToStart => "SS",
            DependencyKind::FinishToFinish => "FF",
            DependencyKind::StartToFinish => "SF",
        }
    }

    pub fn parse(s: &str) -> Option<DependencyKind> {
        match s.trim().to_uppercase().as_str() {
            "FS" => Some(DependencyKind::FinishToStart),
            "SS" => Some(DependencyKind::StartToStart),
            "FF" => Some(DependencyKind::FinishToFinish),
            "SF" => Some(DependencyKind::StartToFinish),
            _ => None,
        }
    }
}

/// Available sorting options for task listings.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortKey {
    Id,
    EndDate,
    Priority,
    Status,
}

/// Lowercase a field token and treat `_` as a space for comparison.
pub fn normalise_token(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fields a task record must carry to validate.
pub const TASK_REQUIRED: &[&str] = &[
    "task_id",
    "task_name",
    "start_date",
    "end_date",
    "priority",
    "status",
];

/// Fields a task record may carry; validated for shape when present.
pub const TASK_OPTIONAL: &[&str] = &[
    "description",
    "progress_percentage",
    "estimated_hours",
    "actual_hours",
    "is_critical_path",
    "category_name",
    "parent_task_id",
    "creator_id",
    "created_date",
    "completed_date",
    "tags",
    "assigned_workers",
    "dependencies",
    "comments",
    "attachments",
];

/// Fields a project record must carry to validate.
pub const PROJECT_REQUIRED: &[&str] = &["project_name", "start_date", "end_date", "status"];

/// Fixed column order of the persisted CSV snapshot.
pub const SNAPSHOT_COLUMNS: &[&str] = &[
    "task_id",
    "task_name",
    "description",
    "start_date",
    "end_date",
    "priority",
    "status",
    "progress_percentage",
    "estimated_hours",
    "actual_hours",
    "is_critical_path",
    "category_name",
    "parent_task_id",
    "creator_id",
    "created_date",
    "completed_date",
];

/// Full round-trip export: the snapshot columns followed by the encoded
/// nested collections.
pub const EXPORT_COLUMNS: &[&str] = &[
    "task_id",
    "task_name",
    "description",
    "start_date",
    "end_date",
    "priority",
    "status",
    "progress_percentage",
    "estimated_hours",
    "actual_hours",
    "is_critical_path",
    "category_name",
    "parent_task_id",
    "creator_id",
    "created_date",
    "completed_date",
    "tags",
    "assigned_workers",
    "dependencies",
    "comments",
    "attachments",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_normalisation() {
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("in progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("IN PROGRESS"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("In Progress"), Some(TaskStatus::InProgress));
        assert_eq!(
            TaskStatus::parse("Pending_review"),
            Some(TaskStatus::PendingReview)
        );
        assert_eq!(TaskStatus::parse("done"), None);
        assert_eq!(TaskStatus::parse(""), None);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(TaskPriority::parse("CRITICAL"), Some(TaskPriority::Critical));
        assert_eq!(TaskPriority::parse(" medium "), Some(TaskPriority::Medium));
        assert_eq!(TaskPriority::parse("urgent"), None);
    }

    #[test]
    fn test_dependency_kind_codes() {
        for code in ["FS", "SS", "FF", "SF"] {
            assert_eq!(DependencyKind::parse(code).unwrap().code(), code);
        }
        assert_eq!(DependencyKind::parse("fs"), Some(DependencyKind::FinishToStart));
        assert_eq!(DependencyKind::parse("XX"), None);
    }

    #[test]
    fn test_column_tables_stay_aligned() {
        for field in TASK_REQUIRED {
            assert!(
                SNAPSHOT_COLUMNS.contains(field),
                "required field {field} missing from snapshot columns"
            );
        }
        for field in SNAPSHOT_COLUMNS {
            assert!(
                TASK_REQUIRED.contains(field) || TASK_OPTIONAL.contains(field),
                "snapshot column {field} missing from field tables"
            );
        }
        assert_eq!(&EXPORT_COLUMNS[..SNAPSHOT_COLUMNS.len()], SNAPSHOT_COLUMNS);
    }
}
