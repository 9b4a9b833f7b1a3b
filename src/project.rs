//! Project-level records: project metadata, workers, templates and the
//! persisted document wrapper.
//!
//! A `ProjectDocument` is the full unit written to disk or pushed to the
//! remote store: project info plus categories, workers and the task list.
//! Loading also accepts a bare task array (see `document_tasks`) for
//! compatibility with older exports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::Task;
use crate::validate;

/// Project metadata carried at the top of a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    pub project_name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub total_budget: Option<f64>,
}

/// A worker known to the project, assignable to tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Worker {
    pub worker_id: Option<u64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub skills: Vec<String>,
    pub hourly_rate: Option<f64>,
}

impl Worker {
    /// Soft checks for a worker record. Workers are never rejected
    /// outright; problems surface as warnings.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.worker_id.is_none() && !has_text(&self.email) {
            issues.push("needs a worker_id or an email".to_string());
        }
        if !has_text(&self.name) && !has_text(&self.role) {
            issues.push("needs a name or a role".to_string());
        }
        if let Some(email) = self.email.as_deref() {
            if !email.trim().is_empty() && !validate::email_is_plausible(email) {
                issues.push(format!("email '{email}' does not look like an address"));
            }
        }
        if let Some(rate) = self.hourly_rate {
            if rate < 0.0 {
                issues.push(format!("hourly_rate {rate} is negative"));
            }
        }
        issues
    }

    /// Label used when reporting issues for this worker.
    pub fn label(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            name.to_string()
        } else if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            email.to_string()
        } else if let Some(id) = self.worker_id {
            format!("worker {id}")
        } else {
            "unnamed worker".to_string()
        }
    }
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// The full persisted unit: project metadata plus categories, workers
/// and tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDocument {
    pub project: ProjectInfo,
    pub categories: Vec<String>,
    pub workers: Vec<Worker>,
    pub tasks: Vec<Task>,
}

/// Borrow the task array out of a raw document value.
///
/// Accepts either the document wrapper (`{"tasks": [...], ...}`) or a
/// bare task array. Anything else is not a task document.
pub fn document_tasks(doc: &Value) -> Option<&Vec<Value>> {
    match doc {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("tasks").and_then(Value::as_array),
        _ => None,
    }
}

/// A named, project-shaped document used to seed a set of tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Template {
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub document: ProjectDocument,
}

/// Defaults applied when a document has to be created from scratch:
/// project metadata, the starting category list and any pre-registered
/// workers. Loadable from a JSON file via `--config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub project: ProjectInfo,
    pub categories: Vec<String>,
    pub workers: Vec<Worker>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            project: ProjectInfo {
                project_name: Some("Default Project".to_string()),
                status: Some("Not Started".to_string()),
                ..ProjectInfo::default()
            },
            categories: vec!["General".to_string()],
            workers: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Read a config file, falling back to the defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &std::path::Path) -> ProjectConfig {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("config file {} is invalid: {e}", path.display());
                    ProjectConfig::default()
                }
            },
            Err(e) => {
                tracing::warn!("could not read config {}: {e}", path.display());
                ProjectConfig::default()
            }
        }
    }

    /// Build a fresh document carrying these defaults and the given tasks.
    pub fn document_with_tasks(&self, tasks: Vec<Task>) -> ProjectDocument {
        ProjectDocument {
            project: self.project.clone(),
            categories: self.categories.clone(),
            workers: self.workers.clone(),
            tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_issues() {
        let ok = Worker {
            name: Some("Ana Torres".into()),
            email: Some("ana@example.com".into()),
            role: Some("Developer".into()),
            ..Worker::default()
        };
        assert!(ok.issues().is_empty());

        let anonymous = Worker::default();
        let issues = anonymous.issues();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("worker_id or an email"));

        let bad_email = Worker {
            worker_id: Some(3),
            role: Some("QA".into()),
            email: Some("not-an-address".into()),
            ..Worker::default()
        };
        assert_eq!(bad_email.issues().len(), 1);
    }

    #[test]
    fn test_worker_label_fallbacks() {
        let by_id = Worker {
            worker_id: Some(9),
            ..Worker::default()
        };
        assert_eq!(by_id.label(), "worker 9");
        assert_eq!(Worker::default().label(), "unnamed worker");
    }

    #[test]
    fn test_document_tasks_accepts_both_shapes() {
        let wrapped = json!({"project": {}, "tasks": [{"task_id": 1}]});
        assert_eq!(document_tasks(&wrapped).map(Vec::len), Some(1));

        let bare = json!([{"task_id": 1}, {"task_id": 2}]);
        assert_eq!(document_tasks(&bare).map(Vec::len), Some(2));

        assert!(document_tasks(&json!("tasks")).is_none());
        assert!(document_tasks(&json!({"items": []})).is_none());
    }

    #[test]
    fn test_template_flattens_document() {
        let raw = json!({
            "name": "Website Launch",
            "description": "Seed plan",
            "project": {"project_name": "Website"},
            "tasks": [{"task_name": "Draft copy"}]
        });
        let template: Template = serde_json::from_value(raw).unwrap();
        assert_eq!(template.name, "Website Launch");
        assert_eq!(template.document.tasks.len(), 1);
        assert_eq!(
            template.document.project.project_name.as_deref(),
            Some("Website")
        );
    }

    #[test]
    fn test_default_config() {
        let config = ProjectConfig::default();
        assert_eq!(config.project.project_name.as_deref(), Some("Default Project"));
        let doc = config.document_with_tasks(Vec::new());
        assert!(doc.tasks.is_empty());
        assert_eq!(doc.categories, vec!["General".to_string()]);
    }
}
