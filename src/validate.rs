//! Schema validation for task and project records.
//!
//! Validation runs over raw JSON values so that records arriving from any
//! source (documents on disk, API bodies, CSV imports, templates) are
//! checked the same way. A pass collects every violation in one go rather
//! than stopping at the first, and never panics on malformed input.

use serde_json::{Map, Value};

use crate::fields::{
    DependencyKind, ProjectStatus, TaskPriority, TaskStatus, PROJECT_REQUIRED, TASK_REQUIRED,
};
use crate::project::ProjectInfo;
use crate::task::{parse_iso_date, Predecessor, Task};

/// Which schema a value is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Task,
    Project,
}

impl RecordKind {
    fn noun(self) -> &'static str {
        match self {
            RecordKind::Task => "task",
            RecordKind::Project => "project",
        }
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    fn from_errors(errors: Vec<String>) -> Validation {
        Validation {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate a raw JSON value against the task or project schema.
pub fn validate_value(value: &Value, kind: RecordKind) -> Validation {
    let Some(map) = value.as_object() else {
        return Validation::from_errors(vec![format!(
            "{} record must be a JSON object",
            kind.noun()
        )]);
    };
    match kind {
        RecordKind::Task => Validation::from_errors(task_errors(map)),
        RecordKind::Project => Validation::from_errors(project_errors(map)),
    }
}

/// Validate a typed task record by round-tripping it through JSON.
pub fn validate_task(task: &Task) -> Validation {
    validate_value(&task.to_value(), RecordKind::Task)
}

/// Validate typed project metadata by round-tripping it through JSON.
pub fn validate_project(project: &ProjectInfo) -> Validation {
    match serde_json::to_value(project) {
        Ok(value) => validate_value(&value, RecordKind::Project),
        Err(e) => Validation::from_errors(vec![format!("project record not serialisable: {e}")]),
    }
}

fn task_errors(map: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();

    for field in TASK_REQUIRED {
        if substantive(map, field).is_none() {
            errors.push(format!("{field} is required"));
        }
    }

    if let Some(id) = substantive(map, "task_id") {
        if !id.as_u64().is_some_and(|n| n > 0) {
            errors.push("task_id must be a positive integer".to_string());
        }
    }
    if let Some(name) = substantive(map, "task_name") {
        if !name.is_string() {
            errors.push("task_name must be a string".to_string());
        }
    }
    if let Some(status) = substantive(map, "status") {
        match status.as_str() {
            Some(s) => {
                if TaskStatus::parse(s).is_none() {
                    errors.push(format!(
                        "status '{s}' is not a valid status. Valid options are: {}",
                        label_list(TaskStatus::ALL.iter().map(|s| s.label()))
                    ));
                }
            }
            None => errors.push("status must be a string".to_string()),
        }
    }
    if let Some(priority) = substantive(map, "priority") {
        match priority.as_str() {
            Some(p) => {
                if TaskPriority::parse(p).is_none() {
                    errors.push(format!(
                        "priority '{p}' is not a valid priority. Valid options are: {}",
                        label_list(TaskPriority::ALL.iter().map(|p| p.label()))
                    ));
                }
            }
            None => errors.push("priority must be a string".to_string()),
        }
    }

    check_date(map, "start_date", &mut errors);
    check_date(map, "end_date", &mut errors);
    check_date_order(map, &mut errors);

    if let Some(progress) = substantive(map, "progress_percentage") {
        match progress.as_f64() {
            Some(p) if (0.0..=100.0).contains(&p) => {}
            Some(_) => errors.push("progress_percentage must be between 0 and 100".to_string()),
            None => errors.push("progress_percentage must be a number".to_string()),
        }
    }
    for field in ["estimated_hours", "actual_hours"] {
        if let Some(hours) = substantive(map, field) {
            match hours.as_f64() {
                Some(h) if h >= 0.0 => {}
                Some(_) => errors.push(format!("{field} must not be negative")),
                None => errors.push(format!("{field} must be a number")),
            }
        }
    }
    if let Some(parent) = substantive(map, "parent_task_id") {
        if !parent.as_u64().is_some_and(|n| n > 0) {
            errors.push("parent_task_id must be a positive integer".to_string());
        }
    }
    if let Some(flag) = substantive(map, "is_critical_path") {
        if !flag.is_boolean() {
            errors.push("is_critical_path must be true or false".to_string());
        }
    }
    if let Some(tags) = substantive(map, "tags") {
        match tags.as_array() {
            Some(items) => {
                if items.iter().any(|t| !t.is_string()) {
                    errors.push("tags must contain only strings".to_string());
                }
            }
            None => errors.push("tags must be a list".to_string()),
        }
    }

    check_workers(map, &mut errors);
    check_dependencies(map, &mut errors);

    errors
}

fn project_errors(map: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();

    for field in PROJECT_REQUIRED {
        if substantive(map, field).is_none() {
            errors.push(format!("{field} is required"));
        }
    }

    if let Some(name) = substantive(map, "project_name") {
        if !name.is_string() {
            errors.push("project_name must be a string".to_string());
        }
    }
    if let Some(status) = substantive(map, "status") {
        match status.as_str() {
            Some(s) => {
                if ProjectStatus::parse(s).is_none() {
                    errors.push(format!(
                        "status '{s}' is not a valid project status. Valid options are: {}",
                        label_list(ProjectStatus::ALL.iter().map(|s| s.label()))
                    ));
                }
            }
            None => errors.push("status must be a string".to_string()),
        }
    }

    check_date(map, "start_date", &mut errors);
    check_date(map, "end_date", &mut errors);
    check_date_order(map, &mut errors);

    if let Some(budget) = substantive(map, "total_budget") {
        match budget.as_f64() {
            Some(b) if b >= 0.0 => {}
            Some(_) => errors.push("total_budget must not be negative".to_string()),
            None => errors.push("total_budget must be a number".to_string()),
        }
    }

    errors
}

/// A field value that actually says something: present, non-null, and not
/// a blank string.
fn substantive<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn check_date(map: &Map<String, Value>, key: &str, errors: &mut Vec<String>) {
    if let Some(value) = substantive(map, key) {
        match value.as_str() {
            Some(s) => {
                if parse_iso_date(s.trim()).is_none() {
                    errors.push(format!("{key} must be a real date in YYYY-MM-DD format"));
                }
            }
            None => errors.push(format!("{key} must be a string")),
        }
    }
}

fn check_date_order(map: &Map<String, Value>, errors: &mut Vec<String>) {
    let date = |key| {
        substantive(map, key)
            .and_then(Value::as_str)
            .and_then(|s| parse_iso_date(s.trim()))
    };
    if let (Some(start), Some(end)) = (date("start_date"), date("end_date")) {
        if start > end {
            errors.push("start_date must not be after end_date".to_string());
        }
    }
}

fn check_workers(map: &Map<String, Value>, errors: &mut Vec<String>) {
    let Some(workers) = substantive(map, "assigned_workers") else {
        return;
    };
    let Some(items) = workers.as_array() else {
        errors.push("assigned_workers must be a list".to_string());
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let Some(worker) = item.as_object() else {
            errors.push(format!("assigned_workers[{i}] must be an object"));
            continue;
        };
        if let Some(email) = worker.get("email").and_then(Value::as_str) {
            if !email.trim().is_empty() && !email_is_plausible(email) {
                errors.push(format!(
                    "assigned_workers[{i}]: email '{email}' does not look like an address"
                ));
            }
        }
    }
}

fn check_dependencies(map: &Map<String, Value>, errors: &mut Vec<String>) {
    let Some(deps) = substantive(map, "dependencies") else {
        return;
    };
    let Some(items) = deps.as_array() else {
        errors.push("dependencies must be a list".to_string());
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let Some(dep) = item.as_object() else {
            errors.push(format!("dependencies[{i}] must be an object"));
            continue;
        };
        match dep.get("dependency_type").and_then(Value::as_str) {
            Some(kind) if !kind.trim().is_empty() => {
                if DependencyKind::parse(kind).is_none() {
                    errors.push(format!(
                        "dependencies[{i}] has unknown dependency_type '{kind}'. Valid options are: FS, SS, FF, SF"
                    ));
                }
            }
            _ => errors.push(format!("dependencies[{i}] is missing a dependency_type")),
        }
    }
}

/// Minimal shape check for an email address: exactly one `@`, non-empty
/// local part and domain, no whitespace in the domain.
pub fn email_is_plausible(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let Some(domain) = parts.next() else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !domain.chars().any(char::is_whitespace)
}

fn label_list<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    labels.collect::<Vec<_>>().join(", ")
}

/// Soft check that every dependency points at a task that exists.
/// Unknown predecessors are reported as warnings, never hard failures.
pub fn dependency_warnings(task: &Task, all: &[Task]) -> Vec<String> {
    let mut warnings = Vec::new();
    for dep in &task.dependencies {
        let known = match &dep.predecessor {
            Predecessor::Id(id) => all.iter().any(|t| t.task_id == Some(*id)),
            Predecessor::Name(name) => {
                let wanted = name.trim().to_lowercase();
                !wanted.is_empty()
                    && all.iter().any(|t| {
                        t.task_name
                            .as_deref()
                            .is_some_and(|n| n.trim().to_lowercase() == wanted)
                    })
            }
        };
        if !known {
            warnings.push(format!(
                "predecessor '{}' does not match any task",
                dep.predecessor
            ));
        }
    }
    warnings
}
