//! Derived-field automation: identifier assignment, record defaults,
//! skill matching and project statistics.
//!
//! Everything here is pure over its inputs. Values the caller supplied are
//! never overwritten; automation only fills gaps and keeps the coupled
//! fields (completion status and progress) consistent.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::fields::{TaskPriority, TaskStatus};
use crate::project::{ProjectDocument, ProjectInfo};
use crate::task::Task;

/// Current time as an RFC 3339 timestamp.
pub fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Smallest positive integer not already used as a task id.
///
/// Gaps left by deletions are reused: ids {1, 3, 4} assign 2 next.
pub fn next_task_id(tasks: &[Task]) -> u64 {
    let used: BTreeSet<u64> = tasks.iter().filter_map(|t| t.task_id).collect();
    let mut candidate = 1;
    while used.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

/// Fill the derived and defaulted fields of a task record.
///
/// Supplied values are preserved; recognisable status and priority
/// spellings are rewritten to their canonical labels. A completed task
/// always ends up with 100% progress and a completion date. Running this
/// twice over a record changes nothing the second time.
pub fn auto_populate_task(mut task: Task, existing: &[Task], creator: &str) -> Task {
    if task.task_id.is_none() {
        task.task_id = Some(next_task_id(existing));
    }
    if blank(&task.status) {
        task.status = Some(TaskStatus::NotStarted.label().to_string());
    } else if let Some(status) = task.status_enum() {
        task.status = Some(status.label().to_string());
    }
    if blank(&task.priority) {
        task.priority = Some(TaskPriority::Medium.label().to_string());
    } else if let Some(priority) = task.priority_enum() {
        task.priority = Some(priority.label().to_string());
    }
    if task.progress_percentage.is_none() {
        task.progress_percentage = Some(0.0);
    }
    if task.description.is_none() {
        task.description = Some(String::new());
    }
    if task.is_critical_path.is_none() {
        task.is_critical_path = Some(false);
    }
    if blank(&task.created_date) {
        task.created_date = Some(now_stamp());
    }
    if blank(&task.creator_id) && !creator.trim().is_empty() {
        task.creator_id = Some(creator.trim().to_string());
    }
    if task.is_completed() {
        // coupled fields, forced regardless of input
        task.progress_percentage = Some(100.0);
        if blank(&task.completed_date) {
            task.completed_date = Some(now_stamp());
        }
    }
    task
}

/// Fill the defaulted fields of project metadata.
pub fn auto_populate_project(mut project: ProjectInfo) -> ProjectInfo {
    if blank(&project.status) {
        project.status = Some("Not Started".to_string());
    } else if let Some(status) = project
        .status
        .as_deref()
        .and_then(crate::fields::ProjectStatus::parse)
    {
        project.status = Some(status.label().to_string());
    }
    if project.total_budget.is_none() {
        project.total_budget = Some(0.0);
    }
    project
}

fn blank(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// How well a worker's skills cover a required set, as a percentage.
///
/// Matching is case-insensitive over trimmed tokens. An empty requirement
/// scores zero.
pub fn skill_match_score(required: &[String], skills: &[String]) -> f64 {
    let wanted: BTreeSet<String> = normalise_all(required);
    if wanted.is_empty() {
        return 0.0;
    }
    let offered: BTreeSet<String> = normalise_all(skills);
    let matched = wanted.intersection(&offered).count();
    matched as f64 / wanted.len() as f64 * 100.0
}

fn normalise_all(tokens: &[String]) -> BTreeSet<String> {
    tokens
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Aggregate statistics over a document's task list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectSummary {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub total_estimated_hours: f64,
    pub total_actual_hours: f64,
    pub average_progress: f64,
    pub tasks_by_status: BTreeMap<String, usize>,
}

/// Compute summary statistics. Safe on empty documents.
pub fn project_summary(document: &ProjectDocument) -> ProjectSummary {
    let mut summary = ProjectSummary {
        total_tasks: document.tasks.len(),
        ..ProjectSummary::default()
    };
    let mut progress_sum = 0.0;
    for task in &document.tasks {
        if task.is_completed() {
            summary.completed_tasks += 1;
        }
        summary.total_estimated_hours += task.estimated_hours.unwrap_or(0.0);
        summary.total_actual_hours += task.actual_hours.unwrap_or(0.0);
        progress_sum += task.progress_percentage.unwrap_or(0.0);
        *summary.tasks_by_status.entry(status_key(task)).or_insert(0) += 1;
    }
    if summary.total_tasks > 0 {
        summary.average_progress = progress_sum / summary.total_tasks as f64;
    }
    summary
}

fn status_key(task: &Task) -> String {
    match task.status_enum() {
        Some(status) => status.label().to_string(),
        None => match task.status.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.to_string(),
            _ => "Unknown".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_id(id: u64) -> Task {
        Task {
            task_id: Some(id),
            ..Task::default()
        }
    }

    #[test]
    fn test_next_id_fills_gaps() {
        assert_eq!(next_task_id(&[]), 1);
        let tasks: Vec<Task> = [1, 3, 4].into_iter().map(task_with_id).collect();
        assert_eq!(next_task_id(&tasks), 2);
        let tasks: Vec<Task> = [2, 3].into_iter().map(task_with_id).collect();
        assert_eq!(next_task_id(&tasks), 1);
        let tasks: Vec<Task> = [1, 2].into_iter().map(task_with_id).collect();
        assert_eq!(next_task_id(&tasks), 3);
    }

    #[test]
    fn test_auto_populate_fills_defaults() {
        let task = auto_populate_task(Task::default(), &[], "ana@example.com");
        assert_eq!(task.task_id, Some(1));
        assert_eq!(task.status.as_deref(), Some("Not Started"));
        assert_eq!(task.priority.as_deref(), Some("Medium"));
        assert_eq!(task.progress_percentage, Some(0.0));
        assert_eq!(task.description.as_deref(), Some(""));
        assert_eq!(task.is_critical_path, Some(false));
        assert_eq!(task.creator_id.as_deref(), Some("ana@example.com"));
        assert!(task.created_date.is_some());
        assert!(task.completed_date.is_none());
    }

    #[test]
    fn test_auto_populate_preserves_and_normalises() {
        let task = Task {
            task_id: Some(40),
            status: Some("on_hold".into()),
            priority: Some("CRITICAL".into()),
            progress_percentage: Some(25.0),
            ..Task::default()
        };
        let task = auto_populate_task(task, &[], "ana@example.com");
        assert_eq!(task.task_id, Some(40));
        assert_eq!(task.status.as_deref(), Some("On Hold"));
        assert_eq!(task.priority.as_deref(), Some("Critical"));
        assert_eq!(task.progress_percentage, Some(25.0));
    }

    #[test]
    fn test_completed_forces_progress_and_date() {
        let task = Task {
            status: Some("completed".into()),
            progress_percentage: Some(10.0),
            ..Task::default()
        };
        let task = auto_populate_task(task, &[], "");
        assert_eq!(task.progress_percentage, Some(100.0));
        assert!(task.completed_date.is_some());
    }

    #[test]
    fn test_auto_populate_is_idempotent() {
        let first = auto_populate_task(
            Task {
                task_name: Some("Write release notes".into()),
                ..Task::default()
            },
            &[],
            "ana@example.com",
        );
        let second = auto_populate_task(first.clone(), &[], "someone-else");
        assert_eq!(first.to_value(), second.to_value());
    }

    #[test]
    fn test_project_defaults() {
        let project = auto_populate_project(ProjectInfo::default());
        assert_eq!(project.status.as_deref(), Some("Not Started"));
        assert_eq!(project.total_budget, Some(0.0));
    }

    #[test]
    fn test_skill_match_score() {
        let required = vec!["Rust".to_string(), "SQL".to_string()];
        let exact = vec!["rust".to_string(), "sql".to_string()];
        assert_eq!(skill_match_score(&required, &exact), 100.0);

        let partial = vec!["rust".to_string(), "docker".to_string()];
        assert_eq!(skill_match_score(&required, &partial), 50.0);

        let disjoint = vec!["go".to_string()];
        assert_eq!(skill_match_score(&required, &disjoint), 0.0);
        assert_eq!(skill_match_score(&[], &exact), 0.0);
    }

    #[test]
    fn test_summary_counts() {
        let document = ProjectDocument {
            tasks: vec![
                Task {
                    status: Some("Completed".into()),
                    progress_percentage: Some(100.0),
                    estimated_hours: Some(8.0),
                    actual_hours: Some(10.0),
                    ..Task::default()
                },
                Task {
                    status: Some("in_progress".into()),
                    progress_percentage: Some(50.0),
                    estimated_hours: Some(4.0),
                    ..Task::default()
                },
            ],
            ..ProjectDocument::default()
        };
        let summary = project_summary(&document);
        assert_eq!(summary.total_tasks, 2);
        assert_eq!(summary.completed_tasks, 1);
        assert_eq!(summary.total_estimated_hours, 12.0);
        assert_eq!(summary.total_actual_hours, 10.0);
        assert_eq!(summary.average_progress, 75.0);
        assert_eq!(summary.tasks_by_status.get("Completed"), Some(&1));
        assert_eq!(summary.tasks_by_status.get("In Progress"), Some(&1));
    }

    #[test]
    fn test_summary_safe_on_empty() {
        let summary = project_summary(&ProjectDocument::default());
        assert_eq!(summary.total_tasks, 0);
        assert_eq!(summary.average_progress, 0.0);
        assert!(summary.tasks_by_status.is_empty());
    }
}
