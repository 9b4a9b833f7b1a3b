//! Task database: the in-memory collection and its load, save, update and
//! import operations.
//!
//! Loading walks an ordered provider chain: the remote store first, the
//! local flat file second, an empty collection last. A provider that
//! fails or returns something unusable drops through to the next, so
//! opening the database never errors. Saving is the opposite of lenient:
//! every record is re-validated and a single failure aborts the whole
//! write, locally and remotely.
//!
//! The revision token obtained at load time is threaded back explicitly
//! on save. A stale token surfaces as a conflict; it is never retried.

use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::automation::{auto_populate_project, auto_populate_task, now_stamp};
use crate::csv;
use crate::docstore::atomic_write;
use crate::fields::normalise_token;
use crate::project::{document_tasks, ProjectConfig, ProjectDocument, ProjectInfo, Template, Worker};
use crate::remote::{RemoteError, RemoteStore, RevisionToken};
use crate::task::Task;
use crate::validate::{
    dependency_warnings, validate_project, validate_task, validate_value, RecordKind,
};

/// Where a load ultimately got its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    LocalFile,
    Empty,
}

impl LoadSource {
    pub fn label(self) -> &'static str {
        match self {
            LoadSource::Remote => "remote store",
            LoadSource::LocalFile => "local file",
            LoadSource::Empty => "empty collection",
        }
    }
}

/// Outcome of a load: provenance, the revision to save against, and the
/// records that were retained despite failing validation.
#[derive(Debug)]
pub struct LoadReport {
    pub source: LoadSource,
    pub revision: Option<RevisionToken>,
    pub count: usize,
    pub invalid: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("validation failed for {0:?}")]
    Invalid(Vec<(String, Vec<String>)>),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("could not write local file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not serialise document: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Result of a successful save.
#[derive(Debug)]
pub struct SaveOutcome {
    pub destination: String,
    pub revision: Option<RevisionToken>,
    pub task_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Replace,
    Merge,
}

/// Options for template imports.
pub struct ImportOptions {
    pub mode: ImportMode,
    pub overrides: Map<String, Value>,
    pub skip_invalid: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            mode: ImportMode::Replace,
            overrides: Map::new(),
            skip_invalid: false,
        }
    }
}

/// Options for CSV imports.
#[derive(Debug, Clone, Copy)]
pub struct CsvImportOptions {
    pub mode: ImportMode,
    pub skip_invalid: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub total: usize,
    pub invalid: Vec<(String, Vec<String>)>,
}

/// Criteria for `get_tasks`. All present criteria must match.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub search: Option<String>,
}

/// The task collection plus the project-level parts of the document it
/// belongs to.
pub struct TaskDb {
    pub tasks: Vec<Task>,
    pub templates: Vec<Template>,
    pub project: ProjectInfo,
    pub categories: Vec<String>,
    pub workers: Vec<Worker>,
    remote: Option<Box<dyn RemoteStore>>,
    local_path: PathBuf,
    templates_path: PathBuf,
}

impl TaskDb {
    /// Build a database over a local flat file, optionally backed by a
    /// remote store. Project-level defaults come from the config.
    pub fn new(
        local_path: impl Into<PathBuf>,
        config: ProjectConfig,
        remote: Option<Box<dyn RemoteStore>>,
    ) -> TaskDb {
        let local_path = local_path.into();
        let templates_path = local_path.with_file_name("templates.json");
        TaskDb {
            tasks: Vec::new(),
            templates: Vec::new(),
            project: config.project,
            categories: config.categories,
            workers: config.workers,
            remote,
            local_path,
            templates_path,
        }
    }

    /// Load tasks then templates. Never errors; anything unreadable
    /// degrades to empty with a warning.
    pub fn initialize(&mut self) -> bool {
        let report = self.load_tasks();
        self.load_templates();
        tracing::info!(
            "initialised with {} task(s) from {} and {} template(s)",
            report.count,
            report.source.label(),
            self.templates.len()
        );
        true
    }

    /// Walk the provider chain and absorb the first document that yields
    /// a task list. Invalid records are retained and reported; records
    /// that are not task-shaped at all are skipped with a warning.
    pub fn load_tasks(&mut self) -> LoadReport {
        let fetched = self.fetch_remote().or_else(|remote_err| {
            tracing::warn!("remote load failed, trying local file: {remote_err}");
            self.read_local()
        });
        let (doc, source, revision) = match fetched {
            Ok(parts) => parts,
            Err(local_err) => {
                tracing::warn!("local load failed, starting empty: {local_err}");
                self.tasks = Vec::new();
                return LoadReport {
                    source: LoadSource::Empty,
                    revision: None,
                    count: 0,
                    invalid: Vec::new(),
                };
            }
        };

        let invalid = self.absorb_document(&doc);
        LoadReport {
            source,
            revision,
            count: self.tasks.len(),
            invalid,
        }
    }

    fn fetch_remote(&self) -> Result<(Value, LoadSource, Option<RevisionToken>), String> {
        let store = self
            .remote
            .as_ref()
            .ok_or_else(|| "no remote store configured".to_string())?;
        let fetched = store.fetch().map_err(|e| e.to_string())?;
        let doc: Value = serde_json::from_str(&fetched.content)
            .map_err(|e| format!("remote document is not valid JSON: {e}"))?;
        if document_tasks(&doc).is_none() {
            return Err("remote document has no task list".to_string());
        }
        Ok((doc, LoadSource::Remote, Some(fetched.revision)))
    }

    fn read_local(&self) -> Result<(Value, LoadSource, Option<RevisionToken>), String> {
        let text = fs::read_to_string(&self.local_path)
            .map_err(|e| format!("{}: {e}", self.local_path.display()))?;
        let doc: Value = serde_json::from_str(&text)
            .map_err(|e| format!("{} is not valid JSON: {e}", self.local_path.display()))?;
        if document_tasks(&doc).is_none() {
            return Err(format!(
                "{} has no task list",
                self.local_path.display()
            ));
        }
        Ok((doc, LoadSource::LocalFile, None))
    }

    fn absorb_document(&mut self, doc: &Value) -> Vec<(String, Vec<String>)> {
        if let Some(map) = doc.as_object() {
            if let Some(project) = map.get("project") {
                if let Ok(info) = serde_json::from_value::<ProjectInfo>(project.clone()) {
                    self.project = info;
                }
            }
            if let Some(categories) = map.get("categories").and_then(Value::as_array) {
                self.categories = categories
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
            }
            if let Some(workers) = map.get("workers") {
                if let Ok(workers) = serde_json::from_value::<Vec<Worker>>(workers.clone()) {
                    self.workers = workers;
                }
            }
        }

        let mut tasks = Vec::new();
        let mut invalid = Vec::new();
        let values = document_tasks(doc).cloned().unwrap_or_default();
        for (i, value) in values.iter().enumerate() {
            let check = validate_value(value, RecordKind::Task);
            match Task::from_value(value.clone()) {
                Ok(task) => {
                    if !check.is_valid {
                        invalid.push((record_label(&task, i), check.errors));
                    }
                    tasks.push(task);
                }
                Err(e) => {
                    tracing::warn!("record {} is not task-shaped, skipping: {e}", i + 1);
                    let mut errors = check.errors;
                    if errors.is_empty() {
                        errors.push(format!("not a usable task record: {e}"));
                    }
                    invalid.push((format!("record {}", i + 1), errors));
                }
            }
        }
        self.tasks = tasks;
        invalid
    }

    /// Re-validate everything and write the full document. Any invalid
    /// record aborts the save; nothing is written partially.
    pub fn save_tasks(
        &mut self,
        message: &str,
        expected: Option<&RevisionToken>,
    ) -> Result<SaveOutcome, SaveError> {
        let mut failures = Vec::new();
        for (i, task) in self.tasks.iter().enumerate() {
            let check = validate_task(task);
            if !check.is_valid {
                failures.push((record_label(task, i), check.errors));
            }
        }
        if !failures.is_empty() {
            return Err(SaveError::Invalid(failures));
        }

        let document = self.document();
        let text = serde_json::to_string_pretty(&document)?;
        let task_count = self.tasks.len();

        if let Some(store) = &self.remote {
            let revision = store.push(&text, expected, message)?;
            // keep the fallback copy fresh; a miss here is not fatal
            if let Err(e) = atomic_write(&self.local_path, &text) {
                tracing::warn!(
                    "saved remotely but could not refresh {}: {e}",
                    self.local_path.display()
                );
            }
            tracing::info!("saved {task_count} task(s) to the remote store at revision {revision}");
            Ok(SaveOutcome {
                destination: "remote store".to_string(),
                revision: Some(revision),
                task_count,
            })
        } else {
            atomic_write(&self.local_path, &text)?;
            tracing::info!(
                "saved {task_count} task(s) to {}",
                self.local_path.display()
            );
            Ok(SaveOutcome {
                destination: self.local_path.display().to_string(),
                revision: None,
                task_count,
            })
        }
    }

    /// The full document as it would be persisted.
    pub fn document(&self) -> ProjectDocument {
        ProjectDocument {
            project: self.project.clone(),
            categories: self.categories.clone(),
            workers: self.workers.clone(),
            tasks: self.tasks.clone(),
        }
    }

    /// Run automation over a raw record, validate, and add it.
    pub fn create_task(&mut self, value: Value, creator: &str) -> Result<Task, Vec<String>> {
        let draft = Task::from_value(value)
            .map_err(|e| vec![format!("not a usable task record: {e}")])?;
        if let Some(id) = draft.task_id {
            if self.get_task(id).is_some() {
                return Err(vec![format!("task_id {id} already exists")]);
            }
        }
        let task = auto_populate_task(draft, &self.tasks, creator);
        let check = validate_task(&task);
        if !check.is_valid {
            return Err(check.errors);
        }
        for warning in dependency_warnings(&task, &self.tasks) {
            tracing::warn!("{}: {warning}", record_label(&task, self.tasks.len()));
        }
        self.tasks.push(task.clone());
        Ok(task)
    }

    /// Shallow-merge a patch over a task and re-validate. The stored
    /// record is untouched unless the merged result passes.
    pub fn update_task(&mut self, id: u64, patch: Value) -> Result<Task, Vec<String>> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.task_id == Some(id))
            .ok_or_else(|| vec![format!("task {id} not found")])?;
        let Some(patch_map) = patch.as_object() else {
            return Err(vec!["patch must be a JSON object".to_string()]);
        };

        let mut merged = self.tasks[index].to_value();
        let Some(target) = merged.as_object_mut() else {
            return Err(vec!["stored record is not an object".to_string()]);
        };
        for (key, value) in patch_map {
            target.insert(key.clone(), value.clone());
        }

        let mut updated = Task::from_value(merged)
            .map_err(|e| vec![format!("patched record is not usable: {e}")])?;
        if updated.is_completed() {
            updated.progress_percentage = Some(100.0);
            if updated
                .completed_date
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
            {
                updated.completed_date = Some(now_stamp());
            }
        }

        let check = validate_task(&updated);
        if !check.is_valid {
            return Err(check.errors);
        }
        if let Some(new_id) = updated.task_id {
            let clash = self
                .tasks
                .iter()
                .enumerate()
                .any(|(i, t)| i != index && t.task_id == Some(new_id));
            if clash {
                return Err(vec![format!("task_id {new_id} already exists")]);
            }
        }
        for warning in dependency_warnings(&updated, &self.tasks) {
            tracing::warn!("task {id}: {warning}");
        }
        self.tasks[index] = updated.clone();
        Ok(updated)
    }

    /// Remove a task. Children pointing at it lose their parent link.
    pub fn delete_task(&mut self, id: u64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.task_id != Some(id));
        if self.tasks.len() == before {
            return false;
        }
        for task in self.tasks.iter_mut() {
            if task.parent_task_id == Some(id) {
                task.parent_task_id = None;
            }
        }
        true
    }

    pub fn get_task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == Some(id))
    }

    /// Tasks matching every present criterion, in collection order.
    pub fn get_tasks(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| filter_matches(task, filter))
            .collect()
    }

    /// Seed the collection from a template. Replace mode adopts the
    /// template's project metadata as well; merge mode upserts by id.
    pub fn import_from_template(
        &mut self,
        template: &Template,
        options: &ImportOptions,
    ) -> Result<ImportOutcome, Vec<String>> {
        let project = auto_populate_project(template.document.project.clone());
        let check = validate_project(&project);
        if !check.is_valid {
            return Err(check
                .errors
                .into_iter()
                .map(|e| format!("template project: {e}"))
                .collect());
        }

        let mut working = match options.mode {
            ImportMode::Replace => Vec::new(),
            ImportMode::Merge => self.tasks.clone(),
        };
        let mut outcome = ImportOutcome::default();
        for (i, seed) in template.document.tasks.iter().enumerate() {
            let label = format!("template task {}", i + 1);
            let mut value = seed.to_value();
            if let Some(target) = value.as_object_mut() {
                for (key, override_value) in &options.overrides {
                    target.insert(key.clone(), override_value.clone());
                }
            }
            let draft = match Task::from_value(value) {
                Ok(task) => task,
                Err(e) => {
                    if options.skip_invalid {
                        tracing::warn!("skipping {label}: {e}");
                        outcome.skipped += 1;
                        continue;
                    }
                    return Err(vec![format!("{label}: not a usable task record: {e}")]);
                }
            };
            if admit_task(&mut working, draft, "template", options.skip_invalid, &label)? {
                outcome.imported += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        if options.mode == ImportMode::Replace {
            self.project = project;
            if !template.document.categories.is_empty() {
                self.categories = template.document.categories.clone();
            }
            if !template.document.workers.is_empty() {
                self.workers = template.document.workers.clone();
            }
        }
        self.tasks = working;
        outcome.total = self.tasks.len();
        Ok(outcome)
    }

    /// Full-export CSV of the current collection.
    pub fn export_csv(&self) -> String {
        csv::export_csv(&self.tasks)
    }

    /// Decode CSV rows, run automation and validation over each, and
    /// adopt the result. Rows that fail validation are skipped when the
    /// options say so; otherwise they are retained and reported in the
    /// outcome, and the next save will refuse until they are repaired.
    pub fn import_csv(
        &mut self,
        text: &str,
        options: &CsvImportOptions,
    ) -> Result<ImportOutcome, Vec<String>> {
        let rows = csv::import_tasks(text).map_err(|e| vec![e.to_string()])?;
        let mut working = match options.mode {
            ImportMode::Replace => Vec::new(),
            ImportMode::Merge => self.tasks.clone(),
        };
        let mut outcome = ImportOutcome::default();
        for (i, draft) in rows.into_iter().enumerate() {
            let label = format!("row {}", i + 2);
            let candidate = auto_populate_task(draft, &working, "");
            let check = validate_task(&candidate);
            if !check.is_valid {
                if options.skip_invalid {
                    tracing::warn!("skipping {label}: {}", check.errors.join("; "));
                    outcome.skipped += 1;
                    continue;
                }
                outcome.invalid.push((label, check.errors));
            }
            upsert_task(&mut working, candidate);
            outcome.imported += 1;
        }
        self.tasks = working;
        outcome.total = self.tasks.len();
        Ok(outcome)
    }

    /// Templates live in a sidecar file next to the local flat file.
    pub fn load_templates(&mut self) {
        self.templates = match fs::read_to_string(&self.templates_path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(templates) => templates,
                Err(e) => {
                    tracing::warn!(
                        "templates file {} is invalid: {e}",
                        self.templates_path.display()
                    );
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        let wanted = name.trim().to_lowercase();
        self.templates
            .iter()
            .find(|t| t.name.trim().to_lowercase() == wanted)
    }

    pub fn local_path(&self) -> &std::path::Path {
        &self.local_path
    }
}

/// Automation, validation, then upsert-by-id into the working set.
/// Returns whether the task was admitted; an error aborts the caller.
fn admit_task(
    working: &mut Vec<Task>,
    draft: Task,
    creator: &str,
    skip_invalid: bool,
    label: &str,
) -> Result<bool, Vec<String>> {
    let candidate = auto_populate_task(draft, working, creator);
    let check = validate_task(&candidate);
    if !check.is_valid {
        if skip_invalid {
            tracing::warn!("skipping {label}: {}", check.errors.join("; "));
            return Ok(false);
        }
        return Err(check
            .errors
            .into_iter()
            .map(|e| format!("{label}: {e}"))
            .collect());
    }
    upsert_task(working, candidate);
    Ok(true)
}

/// Replace the task carrying the same id, or append.
fn upsert_task(working: &mut Vec<Task>, candidate: Task) {
    match candidate
        .task_id
        .and_then(|id| working.iter().position(|t| t.task_id == Some(id)))
    {
        Some(i) => working[i] = candidate,
        None => working.push(candidate),
    }
}

fn filter_matches(task: &Task, filter: &TaskFilter) -> bool {
    if let Some(status) = &filter.status {
        let stored = task.status.as_deref().unwrap_or("");
        if normalise_token(stored) != normalise_token(status) {
            return false;
        }
    }
    if let Some(priority) = &filter.priority {
        let stored = task.priority.as_deref().unwrap_or("");
        if normalise_token(stored) != normalise_token(priority) {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        let stored = task.category_name.as_deref().unwrap_or("").trim().to_lowercase();
        if stored != category.trim().to_lowercase() {
            return false;
        }
    }
    if let Some(assignee) = &filter.assignee {
        let wanted = assignee.trim().to_lowercase();
        let hit = task
            .assigned_workers
            .iter()
            .any(|w| w.email.to_lowercase().contains(&wanted));
        if !hit {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let wanted = search.trim().to_lowercase();
        let name_hit = task
            .task_name
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(&wanted));
        let desc_hit = task
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&wanted));
        let tag_hit = task.tags.iter().any(|t| t.to_lowercase().contains(&wanted));
        if !(name_hit || desc_hit || tag_hit) {
            return false;
        }
    }
    true
}

fn record_label(task: &Task, index: usize) -> String {
    match task.task_id {
        Some(id) => format!("task {id}"),
        None => format!("record {}", index + 1),
    }
}

/// Resolve a task identifier (either an id or a name) to a task id.
/// Ambiguous names list the candidates and ask for the id instead.
pub fn resolve_task_identifier(identifier: &str, db: &TaskDb) -> Result<u64, String> {
    if let Ok(id) = identifier.parse::<u64>() {
        if db.get_task(id).is_some() {
            return Ok(id);
        }
        return Err(format!("Task with ID {id} not found"));
    }

    let wanted = identifier.trim().to_lowercase();
    let matches: Vec<&Task> = db
        .tasks
        .iter()
        .filter(|t| {
            t.task_name
                .as_deref()
                .is_some_and(|n| n.trim().to_lowercase() == wanted)
        })
        .collect();

    match matches.len() {
        0 => Err(format!("No task found with name '{identifier}'")),
        1 => matches[0]
            .task_id
            .ok_or_else(|| format!("Task '{identifier}' has no id yet")),
        _ => {
            let mut msg = format!("Multiple tasks found with name '{identifier}':\n");
            for task in matches {
                msg.push_str(&format!(
                    "  ID {}: {}\n",
                    task.task_id.map_or("?".to_string(), |id| id.to_string()),
                    task.task_name.as_deref().unwrap_or("")
                ));
            }
            msg.push_str("Please use the specific ID instead.");
            Err(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::FileStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn scratch_db() -> TaskDb {
        TaskDb::new("tasks.json", ProjectConfig::default(), None)
    }

    fn seeded_db() -> TaskDb {
        let mut db = scratch_db();
        for (name, status, priority, category) in [
            ("Plan sprint", "Not Started", "High", "Planning"),
            ("Fix login bug", "In Progress", "Critical", "Bugs"),
            ("Update docs", "Completed", "Low", "Docs"),
        ] {
            db.create_task(
                json!({
                    "task_name": name,
                    "start_date": "2026-06-01",
                    "end_date": "2026-06-05",
                    "status": status,
                    "priority": priority,
                    "category_name": category,
                }),
                "ana@example.com",
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn test_create_applies_automation() {
        let mut db = scratch_db();
        let task = db
            .create_task(
                json!({
                    "task_name": "Wire up login",
                    "start_date": "2026-06-01",
                    "end_date": "2026-06-03"
                }),
                "ana@example.com",
            )
            .unwrap();
        assert_eq!(task.task_id, Some(1));
        assert_eq!(task.status.as_deref(), Some("Not Started"));
        assert_eq!(task.priority.as_deref(), Some("Medium"));
        assert_eq!(task.creator_id.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_create_rejects_invalid_and_duplicate() {
        let mut db = scratch_db();
        let errors = db.create_task(json!({}), "ana@example.com").unwrap_err();
        assert!(errors.contains(&"task_name is required".to_string()));
        assert!(db.tasks.is_empty());

        db.create_task(
            json!({
                "task_id": 5,
                "task_name": "First",
                "start_date": "2026-06-01",
                "end_date": "2026-06-02"
            }),
            "",
        )
        .unwrap();
        let errors = db
            .create_task(
                json!({
                    "task_id": 5,
                    "task_name": "Second",
                    "start_date": "2026-06-01",
                    "end_date": "2026-06-02"
                }),
                "",
            )
            .unwrap_err();
        assert_eq!(errors, vec!["task_id 5 already exists".to_string()]);
    }

    #[test]
    fn test_ids_fill_gaps_on_create() {
        let mut db = seeded_db();
        assert!(db.delete_task(2));
        let task = db
            .create_task(
                json!({
                    "task_name": "Reuse the gap",
                    "start_date": "2026-06-01",
                    "end_date": "2026-06-02"
                }),
                "",
            )
            .unwrap();
        assert_eq!(task.task_id, Some(2));
    }

    #[test]
    fn test_update_merges_shallow_and_rolls_back() {
        let mut db = seeded_db();
        let updated = db
            .update_task(1, json!({"priority": "low", "progress_percentage": 30}))
            .unwrap();
        assert_eq!(updated.priority.as_deref(), Some("low"));
        assert_eq!(updated.progress_percentage, Some(30.0));
        // untouched fields survive the merge
        assert_eq!(updated.task_name.as_deref(), Some("Plan sprint"));

        let errors = db
            .update_task(1, json!({"status": "Paused Forever"}))
            .unwrap_err();
        assert!(errors[0].contains("Paused Forever"));
        assert_eq!(
            db.get_task(1).unwrap().status.as_deref(),
            Some("Not Started"),
            "failed update must not change the stored record"
        );
    }

    #[test]
    fn test_update_to_completed_forces_progress() {
        let mut db = seeded_db();
        let updated = db.update_task(1, json!({"status": "completed"})).unwrap();
        assert_eq!(updated.progress_percentage, Some(100.0));
        assert!(updated.completed_date.is_some());
    }

    #[test]
    fn test_delete_clears_parent_links() {
        let mut db = seeded_db();
        db.update_task(2, json!({"parent_task_id": 1})).unwrap();
        assert!(db.delete_task(1));
        assert!(!db.delete_task(1));
        assert_eq!(db.get_task(2).unwrap().parent_task_id, None);
    }

    #[test]
    fn test_filters_and_search() {
        let mut db = seeded_db();
        db.update_task(
            2,
            json!({"assigned_workers": [{"name": "Ana", "email": "ana@example.com", "role": "Dev"}],
                    "tags": ["auth", "urgent"]}),
        )
        .unwrap();

        let by_status = db.get_tasks(&TaskFilter {
            status: Some("in_progress".into()),
            ..TaskFilter::default()
        });
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].task_id, Some(2));

        let by_assignee = db.get_tasks(&TaskFilter {
            assignee: Some("ana@".into()),
            ..TaskFilter::default()
        });
        assert_eq!(by_assignee.len(), 1);

        let by_search = db.get_tasks(&TaskFilter {
            search: Some("AUTH".into()),
            ..TaskFilter::default()
        });
        assert_eq!(by_search.len(), 1);

        let by_category = db.get_tasks(&TaskFilter {
            category: Some("docs".into()),
            ..TaskFilter::default()
        });
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].task_id, Some(3));
    }

    #[test]
    fn test_load_falls_back_to_local_then_empty() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("tasks.json");

        let mut db = TaskDb::new(&local, ProjectConfig::default(), None);
        let report = db.load_tasks();
        assert_eq!(report.source, LoadSource::Empty);
        assert_eq!(report.count, 0);

        std::fs::write(&local, r#"[{"task_id": 1, "task_name": "From disk"}]"#).unwrap();
        let report = db.load_tasks();
        assert_eq!(report.source, LoadSource::LocalFile);
        assert_eq!(report.count, 1);
        assert!(report.revision.is_none());
    }

    #[test]
    fn test_load_prefers_remote_and_carries_revision() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_base_dir(dir.path().join("store")).unwrap();
        store
            .push(
                r#"{"project": {"project_name": "Hosted"}, "tasks": [{"task_id": 7, "task_name": "Remote task", "start_date": "2026-06-01", "end_date": "2026-06-02", "status": "Not Started", "priority": "Low"}]}"#,
                None,
                "seed",
            )
            .unwrap();

        let local = dir.path().join("tasks.json");
        std::fs::write(&local, "[]").unwrap();
        let mut db = TaskDb::new(
            &local,
            ProjectConfig::default(),
            Some(Box::new(
                FileStore::with_base_dir(dir.path().join("store")).unwrap(),
            )),
        );
        let report = db.load_tasks();
        assert_eq!(report.source, LoadSource::Remote);
        assert_eq!(report.revision.as_ref().map(|r| r.as_str()), Some("1"));
        assert_eq!(db.tasks.len(), 1);
        assert_eq!(db.project.project_name.as_deref(), Some("Hosted"));
    }

    #[test]
    fn test_load_retains_invalid_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("tasks.json");
        std::fs::write(
            &local,
            r#"[
                {"task_id": 1, "task_name": "Good", "start_date": "2026-06-01", "end_date": "2026-06-02", "status": "Not Started", "priority": "Low"},
                {"task_id": 2, "task_name": "Bad status", "start_date": "2026-06-01", "end_date": "2026-06-02", "status": "Nope", "priority": "Low"},
                42
            ]"#,
        )
        .unwrap();

        let mut db = TaskDb::new(&local, ProjectConfig::default(), None);
        let report = db.load_tasks();
        // rule-invalid record retained, unshaped record dropped
        assert_eq!(report.count, 2);
        assert_eq!(report.invalid.len(), 2);
        assert_eq!(report.invalid[0].0, "task 2");
        assert!(db.get_task(2).is_some());
    }

    #[test]
    fn test_save_aborts_on_any_invalid_record() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("tasks.json");
        let mut db = TaskDb::new(&local, ProjectConfig::default(), None);
        db.tasks.push(Task {
            task_id: Some(1),
            ..Task::default()
        });

        let result = db.save_tasks("bad save", None);
        assert!(matches!(result, Err(SaveError::Invalid(_))));
        assert!(!local.exists(), "aborted save must not write the file");
    }

    #[test]
    fn test_save_conflict_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("tasks.json");
        let store = || FileStore::with_base_dir(dir.path().join("store")).unwrap();

        let mut db = TaskDb::new(&local, ProjectConfig::default(), Some(Box::new(store())));
        let report = db.load_tasks();
        db.save_tasks("first", report.revision.as_ref()).unwrap();

        // stale view: still holding the pre-save revision
        let result = db.save_tasks("second with stale token", report.revision.as_ref());
        assert!(matches!(
            result,
            Err(SaveError::Remote(RemoteError::Conflict { .. }))
        ));
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("tasks.json");
        let mut db = TaskDb::new(&local, ProjectConfig::default(), None);
        db.create_task(
            json!({
                "task_name": "Persist me",
                "start_date": "2026-06-01",
                "end_date": "2026-06-02"
            }),
            "",
        )
        .unwrap();
        db.save_tasks("save", None).unwrap();

        let mut reloaded = TaskDb::new(&local, ProjectConfig::default(), None);
        let report = reloaded.load_tasks();
        assert_eq!(report.source, LoadSource::LocalFile);
        assert_eq!(reloaded.tasks.len(), 1);
        assert_eq!(
            reloaded.get_task(1).unwrap().task_name.as_deref(),
            Some("Persist me")
        );
    }

    #[test]
    fn test_template_import_replace_merge_and_skip() {
        let template: Template = serde_json::from_value(json!({
            "name": "Kickoff",
            "project": {
                "project_name": "Kickoff",
                "start_date": "2026-07-01",
                "end_date": "2026-07-31",
                "status": "Not Started"
            },
            "categories": ["Setup"],
            "tasks": [
                {"task_name": "Create repo", "start_date": "2026-07-01", "end_date": "2026-07-02"},
                {"task_name": "Broken", "start_date": "2026-07-09", "end_date": "2026-07-01"}
            ]
        }))
        .unwrap();

        let mut db = seeded_db();
        let errors = db
            .import_from_template(&template, &ImportOptions::default())
            .unwrap_err();
        assert!(errors[0].contains("template task 2"));
        assert_eq!(db.tasks.len(), 3, "failed import must not change the db");

        let outcome = db
            .import_from_template(
                &template,
                &ImportOptions {
                    skip_invalid: true,
                    ..ImportOptions::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(db.tasks.len(), 1);
        assert_eq!(db.project.project_name.as_deref(), Some("Kickoff"));
        assert_eq!(db.categories, vec!["Setup".to_string()]);
    }

    #[test]
    fn test_template_overrides_apply_to_each_task() {
        let template: Template = serde_json::from_value(json!({
            "name": "Seed",
            "project": {
                "project_name": "Seed",
                "start_date": "2026-07-01",
                "end_date": "2026-07-31",
                "status": "Not Started"
            },
            "tasks": [
                {"task_name": "One", "start_date": "2026-07-01", "end_date": "2026-07-02"}
            ]
        }))
        .unwrap();

        let mut overrides = Map::new();
        overrides.insert("category_name".to_string(), json!("Imported"));
        let mut db = scratch_db();
        db.import_from_template(
            &template,
            &ImportOptions {
                overrides,
                ..ImportOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            db.tasks[0].category_name.as_deref(),
            Some("Imported")
        );
    }

    #[test]
    fn test_csv_import_validates_rows() {
        let mut db = scratch_db();
        let csv = "task_name,start_date,end_date,status,priority\n\
                   Good row,2026-06-01,2026-06-02,Not Started,Low\n\
                   Bad row,2026-06-09,2026-06-01,Not Started,Low\n";

        let outcome = db
            .import_csv(
                csv,
                &CsvImportOptions {
                    mode: ImportMode::Replace,
                    skip_invalid: false,
                },
            )
            .unwrap();
        assert_eq!(outcome.imported, 2);
        assert_eq!(outcome.invalid.len(), 1);
        assert_eq!(outcome.invalid[0].0, "row 3");
        assert_eq!(db.tasks.len(), 2, "failing rows stay in the collection");
        assert!(matches!(
            db.save_tasks("keep bad row", None),
            Err(SaveError::Invalid(_))
        ));

        let outcome = db
            .import_csv(
                csv,
                &CsvImportOptions {
                    mode: ImportMode::Replace,
                    skip_invalid: true,
                },
            )
            .unwrap();
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.invalid.is_empty());
        assert_eq!(db.tasks[0].task_name.as_deref(), Some("Good row"));
    }

    #[test]
    fn test_resolve_identifier_by_id_and_name() {
        let db = seeded_db();
        assert_eq!(resolve_task_identifier("2", &db), Ok(2));
        assert_eq!(resolve_task_identifier("fix login bug", &db), Ok(2));
        assert!(resolve_task_identifier("99", &db).is_err());
        assert!(resolve_task_identifier("no such task", &db).is_err());
    }
}
