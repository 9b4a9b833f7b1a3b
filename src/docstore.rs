//! File-backed document store behind the persistence service.
//!
//! Each project keys a small family of artifacts in the base directory:
//! the canonical JSON document, a 16-column CSV snapshot, and a directory
//! of per-status projection documents with a summary. The canonical
//! document is the source of truth; every derived artifact can be rebuilt
//! from it.
//!
//! Writes are rejected up front (nothing touched) when the document has
//! no task list or reuses a task id. Accepted writes land artifact by
//! artifact via temp-file-then-rename, canonical document first.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;

use crate::csv::snapshot_csv;
use crate::fields::TaskStatus;
use crate::task::Task;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no document stored for project '{0}'")]
    NotFound(String),
    #[error("document must carry a task list under 'tasks'")]
    TasksNotList,
    #[error("duplicate task ids: {0:?}")]
    DuplicateIds(Vec<u64>),
    #[error("stored document is unreadable: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result of an accepted write.
#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome {
    pub task_count: usize,
    pub projection_count: usize,
}

/// Write a file via a temp sibling and rename, so a reader never sees a
/// partial artifact.
pub fn atomic_write(path: &Path, data: &str) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reduce a caller-supplied project id to filename-safe characters.
/// Everything outside `[A-Za-z0-9_-]` is stripped; an id that sanitizes
/// to nothing selects the default store location.
pub fn sanitize_project_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

struct Artifacts {
    canonical: PathBuf,
    snapshot: PathBuf,
    projections: PathBuf,
}

/// Directory-backed store for project documents and their derived files.
pub struct DocumentStore {
    base: PathBuf,
}

impl DocumentStore {
    pub fn with_base_dir(dir: impl AsRef<Path>) -> std::io::Result<DocumentStore> {
        let base = dir.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(DocumentStore { base })
    }

    fn artifacts(&self, project: &str) -> Artifacts {
        let id = sanitize_project_id(project);
        if id.is_empty() {
            Artifacts {
                canonical: self.base.join("tasks.json"),
                snapshot: self.base.join("tasks.csv"),
                projections: self.base.join("status_projections"),
            }
        } else {
            Artifacts {
                canonical: self.base.join(format!("{id}_tasks.json")),
                snapshot: self.base.join(format!("{id}_tasks.csv")),
                projections: self.base.join(format!("{id}_status_projections")),
            }
        }
    }

    fn project_label(project: &str) -> String {
        let id = sanitize_project_id(project);
        if id.is_empty() {
            "default".to_string()
        } else {
            id
        }
    }

    /// The stored document, verbatim.
    pub fn read(&self, project: &str) -> Result<String, StoreError> {
        let paths = self.artifacts(project);
        if !paths.canonical.exists() {
            return Err(StoreError::NotFound(Self::project_label(project)));
        }
        Ok(fs::read_to_string(&paths.canonical)?)
    }

    /// Validate and persist a document plus its derived artifacts.
    pub fn write(&self, project: &str, document: &Value) -> Result<WriteOutcome, StoreError> {
        let items = task_items(document)?;
        let duplicates = duplicate_ids(items);
        if !duplicates.is_empty() {
            return Err(StoreError::DuplicateIds(duplicates));
        }

        let paths = self.artifacts(project);
        let canonical = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        atomic_write(&paths.canonical, &canonical)?;
        self.write_snapshot(&paths, items)?;
        let projection_count = self.write_projections(&paths, items)?;
        tracing::info!(
            "stored {} task(s) for project '{}' ({} status projection(s))",
            items.len(),
            Self::project_label(project),
            projection_count
        );
        Ok(WriteOutcome {
            task_count: items.len(),
            projection_count,
        })
    }

    /// Rebuild the CSV snapshot from the canonical document.
    pub fn regenerate_csv(&self, project: &str) -> Result<usize, StoreError> {
        let document = self.load_canonical(project)?;
        let items = task_items(&document)?;
        let paths = self.artifacts(project);
        self.write_snapshot(&paths, items)?;
        Ok(items.len())
    }

    /// Rebuild the per-status projections and summary from the canonical
    /// document.
    pub fn regenerate_projections(&self, project: &str) -> Result<usize, StoreError> {
        let document = self.load_canonical(project)?;
        let items = task_items(&document)?;
        let paths = self.artifacts(project);
        self.write_projections(&paths, items)
    }

    fn load_canonical(&self, project: &str) -> Result<Value, StoreError> {
        let text = self.read(project)?;
        serde_json::from_str(&text).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn write_snapshot(&self, paths: &Artifacts, items: &[Value]) -> Result<(), StoreError> {
        let mut tasks = Vec::new();
        for (i, item) in items.iter().enumerate() {
            match Task::from_value(item.clone()) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!("record {} left out of the snapshot: {e}", i + 1),
            }
        }
        atomic_write(&paths.snapshot, &snapshot_csv(&tasks))?;
        Ok(())
    }

    fn write_projections(&self, paths: &Artifacts, items: &[Value]) -> Result<usize, StoreError> {
        // stale projections from a previous document must not linger
        if paths.projections.exists() {
            fs::remove_dir_all(&paths.projections)?;
        }
        fs::create_dir_all(&paths.projections)?;

        let mut groups: BTreeMap<String, (String, Vec<&Value>)> = BTreeMap::new();
        for item in items {
            let display = status_display(item);
            let slug = status_slug(&display);
            let entry = groups.entry(slug).or_insert_with(|| (display, Vec::new()));
            entry.1.push(item);
        }

        let mut counts = BTreeMap::new();
        for (slug, (display, group)) in &groups {
            counts.insert(display.clone(), group.len());
            let projection = json!({
                "status": display,
                "count": group.len(),
                "tasks": group,
            });
            let text = serde_json::to_string_pretty(&projection)
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
            atomic_write(&paths.projections.join(format!("{slug}.json")), &text)?;
        }

        let summary = json!({
            "total_tasks": items.len(),
            "counts_by_status": counts,
        });
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        atomic_write(&paths.projections.join("summary.json"), &text)?;
        Ok(groups.len())
    }
}

/// The document's task list. Only a wrapper object with a `tasks` array
/// is storable.
fn task_items(document: &Value) -> Result<&Vec<Value>, StoreError> {
    document
        .as_object()
        .and_then(|map| map.get("tasks"))
        .and_then(Value::as_array)
        .ok_or(StoreError::TasksNotList)
}

/// Every id used by more than one record, in ascending order.
fn duplicate_ids(items: &[Value]) -> Vec<u64> {
    let mut seen: BTreeMap<u64, usize> = BTreeMap::new();
    for item in items {
        if let Some(id) = item.get("task_id").and_then(Value::as_u64) {
            *seen.entry(id).or_insert(0) += 1;
        }
    }
    seen.into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id)
        .collect()
}

fn status_display(item: &Value) -> String {
    let raw = item
        .get("status")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if raw.is_empty() {
        return "Unknown".to_string();
    }
    match TaskStatus::parse(raw) {
        Some(status) => status.label().to_string(),
        None => raw.to_string(),
    }
}

fn status_slug(display: &str) -> String {
    let slug = display
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_document() -> Value {
        json!({
            "project": {"project_name": "Relaunch"},
            "tasks": [
                {"task_id": 1, "task_name": "Plan", "status": "In Progress"},
                {"task_id": 2, "task_name": "Build", "status": "in_progress"},
                {"task_id": 3, "task_name": "Ship", "status": "Completed"}
            ]
        })
    }

    #[test]
    fn test_sanitize_project_id() {
        assert_eq!(sanitize_project_id("Team Alpha!"), "TeamAlpha");
        assert_eq!(sanitize_project_id("../../etc"), "etc");
        assert_eq!(sanitize_project_id("release-2_beta"), "release-2_beta");
        assert_eq!(sanitize_project_id("!!!"), "");
    }

    #[test]
    fn test_write_produces_every_artifact() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::with_base_dir(dir.path()).unwrap();
        let outcome = store.write("", &sample_document()).unwrap();
        assert_eq!(outcome.task_count, 3);
        assert_eq!(outcome.projection_count, 2);

        assert!(dir.path().join("tasks.json").exists());
        assert!(dir.path().join("tasks.csv").exists());
        let projections = dir.path().join("status_projections");
        assert!(projections.join("in_progress.json").exists());
        assert!(projections.join("completed.json").exists());
        assert!(projections.join("summary.json").exists());

        let stored: Value = serde_json::from_str(&store.read("").unwrap()).unwrap();
        assert_eq!(stored, sample_document());
    }

    #[test]
    fn test_named_project_layout() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::with_base_dir(dir.path()).unwrap();
        store.write("alpha", &sample_document()).unwrap();
        assert!(dir.path().join("alpha_tasks.json").exists());
        assert!(dir.path().join("alpha_tasks.csv").exists());
        assert!(dir.path().join("alpha_status_projections").is_dir());
    }

    #[test]
    fn test_summary_counts_by_status() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::with_base_dir(dir.path()).unwrap();
        store.write("", &sample_document()).unwrap();

        let raw = std::fs::read_to_string(
            dir.path().join("status_projections").join("summary.json"),
        )
        .unwrap();
        let summary: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(summary["total_tasks"], json!(3));
        assert_eq!(summary["counts_by_status"]["In Progress"], json!(2));
        assert_eq!(summary["counts_by_status"]["Completed"], json!(1));
    }

    #[test]
    fn test_duplicate_ids_rejected_with_nothing_written() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::with_base_dir(dir.path()).unwrap();
        store.write("", &sample_document()).unwrap();
        let before = store.read("").unwrap();

        let doubled = json!({
            "tasks": [
                {"task_id": 3, "task_name": "A"},
                {"task_id": 3, "task_name": "B"},
                {"task_id": 7, "task_name": "C"},
                {"task_id": 7, "task_name": "D"}
            ]
        });
        let err = store.write("", &doubled).unwrap_err();
        match err {
            StoreError::DuplicateIds(ids) => assert_eq!(ids, vec![3, 7]),
            other => panic!("expected DuplicateIds, got {other:?}"),
        }
        assert_eq!(store.read("").unwrap(), before);
    }

    #[test]
    fn test_tasks_must_be_a_list() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::with_base_dir(dir.path()).unwrap();
        for document in [json!({}), json!({"tasks": "three"}), json!([1, 2, 3])] {
            assert!(matches!(
                store.write("", &document),
                Err(StoreError::TasksNotList)
            ));
        }
        assert!(matches!(store.read(""), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_rewrite_drops_stale_projections() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::with_base_dir(dir.path()).unwrap();
        store.write("", &sample_document()).unwrap();
        let completed = dir.path().join("status_projections").join("completed.json");
        assert!(completed.exists());

        let only_open = json!({
            "tasks": [{"task_id": 1, "task_name": "Plan", "status": "Not Started"}]
        });
        store.write("", &only_open).unwrap();
        assert!(!completed.exists());
        assert!(dir
            .path()
            .join("status_projections")
            .join("not_started.json")
            .exists());
    }

    #[test]
    fn test_regeneration_from_canonical() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::with_base_dir(dir.path()).unwrap();
        store.write("", &sample_document()).unwrap();

        std::fs::remove_file(dir.path().join("tasks.csv")).unwrap();
        std::fs::remove_dir_all(dir.path().join("status_projections")).unwrap();

        assert_eq!(store.regenerate_csv("").unwrap(), 3);
        assert_eq!(store.regenerate_projections("").unwrap(), 2);
        assert!(dir.path().join("tasks.csv").exists());
        assert!(dir
            .path()
            .join("status_projections")
            .join("summary.json")
            .exists());
    }

    #[test]
    fn test_read_not_found_names_the_project() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::with_base_dir(dir.path()).unwrap();
        let err = store.read("ghost").unwrap_err();
        assert_eq!(err.to_string(), "no document stored for project 'ghost'");
    }
}
