//! Command implementations for the CLI interface.
//!
//! Every subcommand lives here as a `cmd_*` function. Handlers print
//! results to stdout, report problems on stderr and exit non-zero.
//! Mutating handlers run a load / mutate / save cycle against the task
//! database and pass the loaded revision token back into the save so a
//! concurrent writer surfaces as a conflict instead of a lost update.

use clap::Subcommand;
use clap_complete::{generate, Shell};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate};
use serde_json::{json, Map, Value};

use crate::automation::{
    auto_populate_project, auto_populate_task, project_summary, skill_match_score,
};
use crate::db::{
    resolve_task_identifier, CsvImportOptions, ImportMode, ImportOptions, LoadReport, SaveError,
    TaskDb, TaskFilter,
};
use crate::docstore::{atomic_write, DocumentStore};
use crate::fields::{SortKey, TaskPriority, TaskStatus};
use crate::project::{document_tasks, ProjectInfo, Worker};
use crate::service::PersistService;
use crate::task::{parse_iso_date, Task};
use crate::validate::{validate_value, RecordKind};

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new task.
    Add {
        /// Task name.
        name: String,
        /// Optional longer description.
        #[arg(long)]
        description: Option<String>,
        /// Planned start date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        start: Option<String>,
        /// Planned end date (YYYY-MM-DD). Defaults to a week after the start.
        #[arg(long)]
        end: Option<String>,
        /// Priority: Low | Medium | High | Critical. Defaults to Medium.
        #[arg(long)]
        priority: Option<String>,
        /// Status. Defaults to "Not Started".
        #[arg(long)]
        status: Option<String>,
        /// Category name.
        #[arg(long)]
        category: Option<String>,
        /// Parent task ID.
        #[arg(long)]
        parent: Option<u64>,
        /// Comma-separated tags. May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Assign a worker as name:email:role. May be repeated.
        #[arg(long = "assign")]
        assignees: Vec<String>,
        /// Estimated effort in hours.
        #[arg(long)]
        estimated_hours: Option<f64>,
        /// Mark the task as being on the critical path.
        #[arg(long)]
        critical: bool,
        /// Creator recorded on the task.
        #[arg(long, default_value = "cli")]
        creator: String,
    },

    /// List tasks with optional filters.
    List {
        /// Filter by status.
        #[arg(long)]
        status: Option<String>,
        /// Filter by priority.
        #[arg(long)]
        priority: Option<String>,
        /// Filter by category.
        #[arg(long)]
        category: Option<String>,
        /// Filter by assigned worker email (substring match).
        #[arg(long)]
        assignee: Option<String>,
        /// Free-text search over names, descriptions and tags.
        #[arg(long)]
        search: Option<String>,
        /// Sort key.
        #[arg(long, value_enum, default_value_t = SortKey::Id)]
        sort: SortKey,
        /// Limit number of rows printed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// View a single task by ID or name.
    View {
        /// Task ID or name to view.
        id: String,
    },

    /// Update fields on a task.
    Update {
        /// Task ID or name to update.
        id: String,
        /// Field assignment as field=value. Values parse as JSON where
        /// possible, otherwise as plain strings. May be repeated.
        #[arg(long = "set")]
        sets: Vec<String>,
    },

    /// Mark a task completed.
    Complete {
        /// Task ID or name to complete.
        id: String,
    },

    /// Delete a task by ID or name.
    Delete {
        /// Task ID or name to delete.
        id: String,
    },

    /// Export tasks to CSV format.
    Export {
        /// Output file path (default: tasks.csv).
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Import tasks from CSV format.
    Import {
        /// Input CSV file path.
        input: String,
        /// Merge into the current collection instead of replacing it.
        #[arg(long)]
        merge: bool,
        /// Skip rows that fail validation instead of aborting.
        #[arg(long)]
        skip_invalid: bool,
        /// Skip creating a backup before import.
        #[arg(long)]
        no_backup: bool,
    },

    /// Manage project templates.
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Print project statistics.
    Summary {
        /// Emit the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rank registered workers by skill match against a task's tags.
    MatchWorkers {
        /// Task ID or name to match against.
        id: String,
        /// Limit number of workers printed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run the HTTP persistence service over a document store.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:7878")]
        addr: String,
        /// Base directory of the document store.
        #[arg(long, default_value = "store")]
        dir: PathBuf,
    },

    /// Validate the records in a task document file.
    Validate {
        /// Path to the JSON document to check.
        file: PathBuf,
    },

    /// Rebuild a stored document's CSV snapshot.
    RegenCsv {
        /// Base directory of the document store.
        #[arg(long, default_value = "store")]
        dir: PathBuf,
        /// Project id within the store.
        #[arg(long)]
        project: Option<String>,
    },

    /// Rebuild a stored document's status projections and summary.
    RegenProjections {
        /// Base directory of the document store.
        #[arg(long, default_value = "store")]
        dir: PathBuf,
        /// Project id within the store.
        #[arg(long)]
        project: Option<String>,
    },

    /// Fill derived fields into a legacy task document, in place.
    Enrich {
        /// Path to the JSON document to enrich.
        file: PathBuf,
        /// Creator recorded on tasks that have none.
        #[arg(long, default_value = "cli")]
        creator: String,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum TemplateAction {
    /// List all available templates.
    List,
    /// Seed the task collection from a template.
    Import {
        /// Template name.
        name: String,
        /// Merge the template's tasks into the current collection
        /// instead of replacing it.
        #[arg(long)]
        merge: bool,
        /// Field override as field=value, applied to every seeded task.
        /// May be repeated.
        #[arg(long = "set")]
        sets: Vec<String>,
        /// Skip template tasks that fail validation instead of aborting.
        #[arg(long)]
        skip_invalid: bool,
    },
}

/// Add a new task to the collection.
pub fn cmd_add(
    db: &mut TaskDb,
    name: String,
    description: Option<String>,
    start: Option<String>,
    end: Option<String>,
    priority: Option<String>,
    status: Option<String>,
    category: Option<String>,
    parent: Option<u64>,
    tags: Vec<String>,
    assignees: Vec<String>,
    estimated_hours: Option<f64>,
    critical: bool,
    creator: String,
) {
    let report = load_and_report(db);

    let today = Local::now().date_naive();
    let start = start.unwrap_or_else(|| today.to_string());
    let end = end.unwrap_or_else(|| {
        (parse_iso_date(&start).unwrap_or(today) + Duration::days(7)).to_string()
    });

    let mut record = Map::new();
    record.insert("task_name".to_string(), Value::String(name));
    if let Some(d) = description {
        record.insert("description".to_string(), Value::String(d));
    }
    record.insert("start_date".to_string(), Value::String(start));
    record.insert("end_date".to_string(), Value::String(end));
    if let Some(p) = priority {
        record.insert("priority".to_string(), Value::String(p));
    }
    if let Some(s) = status {
        record.insert("status".to_string(), Value::String(s));
    }
    if let Some(c) = category {
        record.insert("category_name".to_string(), Value::String(c));
    }
    if let Some(p) = parent {
        record.insert("parent_task_id".to_string(), json!(p));
    }
    let tags = split_tags(&tags);
    if !tags.is_empty() {
        record.insert("tags".to_string(), json!(tags));
    }
    if !assignees.is_empty() {
        let workers: Vec<Value> = assignees.iter().map(|s| worker_value(s)).collect();
        record.insert("assigned_workers".to_string(), Value::Array(workers));
    }
    if let Some(h) = estimated_hours {
        record.insert("estimated_hours".to_string(), json!(h));
    }
    if critical {
        record.insert("is_critical_path".to_string(), Value::Bool(true));
    }

    let task = match db.create_task(Value::Object(record), &creator) {
        Ok(task) => task,
        Err(errors) => fail_validation(errors),
    };
    let id = task.task_id.unwrap_or_default();
    save_or_exit(db, &format!("add task {id}"), &report);
    println!(
        "Added task {} '{}'",
        id,
        task.task_name.as_deref().unwrap_or("")
    );
}

/// List tasks with optional filtering and sorting.
pub fn cmd_list(db: &mut TaskDb, filter: TaskFilter, sort: SortKey, limit: Option<usize>) {
    load_and_report(db);
    let mut rows = db.get_tasks(&filter);

    match sort {
        SortKey::Id => rows.sort_by_key(|t| id_key(t)),
        SortKey::EndDate => {
            rows.sort_by_key(|t| (t.end().unwrap_or(NaiveDate::MAX), id_key(t)));
        }
        SortKey::Priority => {
            rows.sort_by(|a, b| {
                priority_rank(a)
                    .cmp(&priority_rank(b))
                    .then(id_key(a).cmp(&id_key(b)))
            });
        }
        SortKey::Status => {
            rows.sort_by(|a, b| {
                status_rank(a)
                    .cmp(&status_rank(b))
                    .then(id_key(a).cmp(&id_key(b)))
            });
        }
    }

    if let Some(n) = limit {
        rows.truncate(n);
    }
    print_table(&rows);
}

/// View detailed information about a specific task.
pub fn cmd_view(db: &mut TaskDb, id: String) {
    load_and_report(db);
    let task_id = resolve_or_exit(&id, db);
    let Some(task) = db.get_task(task_id) else {
        eprintln!("Task {task_id} not found.");
        std::process::exit(1);
    };

    let dash = || "-".to_string();
    println!(
        "ID:              {}",
        task.task_id.map(|i| i.to_string()).unwrap_or_else(dash)
    );
    println!("Name:            {}", task.task_name.as_deref().unwrap_or("-"));
    println!("Status:          {}", task.status.as_deref().unwrap_or("-"));
    println!("Priority:        {}", task.priority.as_deref().unwrap_or("-"));
    println!("Category:        {}", task.category_name.as_deref().unwrap_or("-"));
    println!("Start:           {}", task.start_date.as_deref().unwrap_or("-"));
    println!("End:             {}", task.end_date.as_deref().unwrap_or("-"));
    println!(
        "Progress:        {}",
        task.progress_percentage
            .map(|p| format!("{p}%"))
            .unwrap_or_else(dash)
    );
    println!(
        "Estimated hours: {}",
        task.estimated_hours.map(|h| h.to_string()).unwrap_or_else(dash)
    );
    println!(
        "Actual hours:    {}",
        task.actual_hours.map(|h| h.to_string()).unwrap_or_else(dash)
    );
    println!(
        "Critical path:   {}",
        task.is_critical_path
            .map(|b| if b { "yes".to_string() } else { "no".to_string() })
            .unwrap_or_else(dash)
    );
    println!(
        "Parent:          {}",
        task.parent_task_id.map(|p| p.to_string()).unwrap_or_else(dash)
    );
    println!(
        "Tags:            {}",
        if task.tags.is_empty() { dash() } else { task.tags.join(",") }
    );
    println!("Creator:         {}", task.creator_id.as_deref().unwrap_or("-"));
    println!("Created:         {}", task.created_date.as_deref().unwrap_or("-"));
    println!("Completed:       {}", task.completed_date.as_deref().unwrap_or("-"));
    if !task.assigned_workers.is_empty() {
        println!("Assigned:");
        for worker in &task.assigned_workers {
            println!("  - {} <{}> ({})", worker.name, worker.email, worker.role);
        }
    }
    if !task.dependencies.is_empty() {
        println!("Depends on:");
        for dep in &task.dependencies {
            println!(
                "  - {} [{}, lag {}d]",
                dep.predecessor, dep.dependency_type, dep.lag_days
            );
        }
    }
    println!("Description:\n{}", task.description.as_deref().unwrap_or("-"));
    if !task.comments.is_empty() {
        println!("Comments:");
        for comment in &task.comments {
            println!("  [{}] {}: {}", comment.timestamp, comment.author, comment.text);
        }
    }
}

/// Apply field assignments to an existing task.
pub fn cmd_update(db: &mut TaskDb, id: String, sets: Vec<String>) {
    if sets.is_empty() {
        eprintln!("Nothing to update. Pass at least one --set field=value.");
        std::process::exit(1);
    }
    let patch = match parse_overrides(&sets) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let report = load_and_report(db);
    let task_id = resolve_or_exit(&id, db);
    if let Err(errors) = db.update_task(task_id, Value::Object(patch)) {
        fail_validation(errors);
    }
    save_or_exit(db, &format!("update task {task_id}"), &report);
    println!("Updated task {task_id}");
}

/// Mark a task completed. Progress and the completion date follow.
pub fn cmd_complete(db: &mut TaskDb, id: String) {
    let report = load_and_report(db);
    let task_id = resolve_or_exit(&id, db);
    if let Err(errors) = db.update_task(task_id, json!({"status": "Completed"})) {
        fail_validation(errors);
    }
    save_or_exit(db, &format!("complete task {task_id}"), &report);
    println!("Marked task {task_id} completed.");
}

/// Delete a task. Children keep existing but lose their parent link.
pub fn cmd_delete(db: &mut TaskDb, id: String) {
    let report = load_and_report(db);
    let task_id = resolve_or_exit(&id, db);
    if !db.delete_task(task_id) {
        eprintln!("Task {task_id} not found.");
        std::process::exit(1);
    }
    save_or_exit(db, &format!("delete task {task_id}"), &report);
    println!("Deleted task {task_id}.");
}

/// Export the full collection to a CSV file.
pub fn cmd_export(db: &mut TaskDb, output: Option<String>) {
    load_and_report(db);
    let output_path = output.unwrap_or_else(|| "tasks.csv".to_string());
    match fs::write(&output_path, db.export_csv()) {
        Ok(()) => println!("Exported {} task(s) to {}", db.tasks.len(), output_path),
        Err(e) => {
            eprintln!("Failed to write CSV file: {e}");
            std::process::exit(1);
        }
    }
}

/// Import tasks from CSV with automatic backup.
pub fn cmd_import(
    db: &mut TaskDb,
    input: String,
    merge: bool,
    skip_invalid: bool,
    no_backup: bool,
) {
    let report = load_and_report(db);

    if !no_backup {
        match create_backup(db.local_path()) {
            Ok(backup_path) => {
                println!("Created backup: {backup_path}");
            }
            Err(e) => {
                eprintln!("Warning: Failed to create backup: {e}");
                print!("Continue without backup? (y/N): ");
                use std::io::{self, Write};
                io::stdout().flush().unwrap_or_default();

                let mut response = String::new();
                if io::stdin().read_line(&mut response).is_err()
                    || !response.trim().to_lowercase().starts_with('y')
                {
                    println!("Import cancelled.");
                    return;
                }
            }
        }
    }

    let text = match fs::read_to_string(&input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read CSV file '{input}': {e}");
            std::process::exit(1);
        }
    };

    let options = CsvImportOptions {
        mode: if merge { ImportMode::Merge } else { ImportMode::Replace },
        skip_invalid,
    };
    let outcome = match db.import_csv(&text, &options) {
        Ok(outcome) => outcome,
        Err(errors) => fail_validation(errors),
    };
    for (label, errors) in &outcome.invalid {
        eprintln!("Warning: {label} fails validation: {}", errors.join("; "));
    }
    save_or_exit(
        db,
        &format!("import {} task(s) from {input}", outcome.imported),
        &report,
    );
    println!(
        "Import completed. {} imported, {} skipped, {} total.",
        outcome.imported, outcome.skipped, outcome.total
    );
}

/// Handle template management commands.
pub fn cmd_template(db: &mut TaskDb, action: TemplateAction) {
    match action {
        TemplateAction::List => {
            db.initialize();
            if db.templates.is_empty() {
                println!("No templates found.");
                return;
            }
            println!("{:<20} {:<6} {}", "Name", "Tasks", "Description");
            for template in &db.templates {
                println!(
                    "{:<20} {:<6} {}",
                    truncate(&template.name, 20),
                    template.document.tasks.len(),
                    template.description.as_deref().unwrap_or("-")
                );
            }
        }

        TemplateAction::Import { name, merge, sets, skip_invalid } => {
            let overrides = match parse_overrides(&sets) {
                Ok(map) => map,
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            };
            let report = load_and_report(db);
            db.load_templates();
            let Some(template) = db.template(&name).cloned() else {
                eprintln!("Template '{name}' not found.");
                std::process::exit(1);
            };

            let options = ImportOptions {
                mode: if merge { ImportMode::Merge } else { ImportMode::Replace },
                overrides,
                skip_invalid,
            };
            let outcome = match db.import_from_template(&template, &options) {
                Ok(outcome) => outcome,
                Err(errors) => fail_validation(errors),
            };
            save_or_exit(db, &format!("apply template '{}'", template.name), &report);
            println!(
                "Applied template '{}'. {} imported, {} skipped, {} total.",
                template.name, outcome.imported, outcome.skipped, outcome.total
            );
        }
    }
}

/// Print aggregate statistics for the project document.
pub fn cmd_summary(db: &mut TaskDb, json: bool) {
    load_and_report(db);
    let summary = project_summary(&db.document());

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Failed to serialise summary: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!(
        "Project:          {}",
        db.project.project_name.as_deref().unwrap_or("-")
    );
    println!(
        "Status:           {}",
        db.project.status.as_deref().unwrap_or("-")
    );
    println!(
        "Tasks:            {} ({} completed)",
        summary.total_tasks, summary.completed_tasks
    );
    println!("Estimated hours:  {:.1}", summary.total_estimated_hours);
    println!("Actual hours:     {:.1}", summary.total_actual_hours);
    println!("Average progress: {:.1}%", summary.average_progress);
    if !summary.tasks_by_status.is_empty() {
        println!("By status:");
        for (status, count) in &summary.tasks_by_status {
            println!("  {status:<14} {count}");
        }
    }
}

/// Rank the project's workers by how well their skills cover a task's
/// tags.
pub fn cmd_match_workers(db: &mut TaskDb, id: String, limit: Option<usize>) {
    load_and_report(db);
    let task_id = resolve_or_exit(&id, db);
    let Some(task) = db.get_task(task_id) else {
        eprintln!("Task {task_id} not found.");
        std::process::exit(1);
    };
    if task.tags.is_empty() {
        println!("Task {task_id} has no tags; nothing to match against.");
        return;
    }
    if db.workers.is_empty() {
        println!("No workers registered in the project document.");
        return;
    }

    let mut ranked: Vec<(f64, &Worker)> = db
        .workers
        .iter()
        .map(|w| (skill_match_score(&task.tags, &w.skills), w))
        .collect();
    ranked.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.label().cmp(&b.1.label()))
    });
    if let Some(n) = limit {
        ranked.truncate(n);
    }

    println!(
        "Skill match for task {} '{}' (tags: {})",
        task_id,
        task.task_name.as_deref().unwrap_or("-"),
        task.tags.join(",")
    );
    println!("{:<24} {:>7}  {}", "Worker", "Match", "Skills");
    for (score, worker) in ranked {
        println!(
            "{:<24} {:>6.1}%  {}",
            truncate(&worker.label(), 24),
            score,
            worker.skills.join(",")
        );
    }
}

/// Run the persistence service until interrupted.
pub fn cmd_serve(addr: &str, dir: &Path) {
    let store = open_store(dir);
    let service = match PersistService::bind(addr, store) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to start service: {e}");
            std::process::exit(1);
        }
    };
    match service.local_addr() {
        Some(local) => println!(
            "Serving task documents from {} on http://{local}",
            dir.display()
        ),
        None => println!("Serving task documents from {}", dir.display()),
    }
    service.run();
}

/// Validate every record in a document file. Exits non-zero when any
/// record fails.
pub fn cmd_validate(file: &Path) {
    let text = match fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", file.display());
            std::process::exit(1);
        }
    };
    let doc: Value = match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{} is not valid JSON: {e}", file.display());
            std::process::exit(1);
        }
    };
    let Some(items) = document_tasks(&doc) else {
        eprintln!("{} does not contain a task list.", file.display());
        std::process::exit(1);
    };

    let mut checked = 0usize;
    let mut failed = 0usize;
    if let Some(project) = doc.get("project") {
        checked += 1;
        let check = validate_value(project, RecordKind::Project);
        if !check.is_valid {
            failed += 1;
            for error in &check.errors {
                println!("project: {error}");
            }
        }
    }
    for (i, item) in items.iter().enumerate() {
        checked += 1;
        let check = validate_value(item, RecordKind::Task);
        if !check.is_valid {
            failed += 1;
            let label = item
                .get("task_id")
                .and_then(Value::as_u64)
                .map(|id| format!("task {id}"))
                .unwrap_or_else(|| format!("record {}", i + 1));
            for error in &check.errors {
                println!("{label}: {error}");
            }
        }
    }

    if failed == 0 {
        println!("All {checked} record(s) pass validation.");
    } else {
        println!("{failed} of {checked} record(s) fail validation.");
        std::process::exit(1);
    }
}

/// Rebuild the CSV snapshot for a stored document.
pub fn cmd_regen_csv(dir: &Path, project: Option<String>) {
    let store = open_store(dir);
    match store.regenerate_csv(&project.unwrap_or_default()) {
        Ok(count) => println!("Rebuilt the CSV snapshot from {count} task(s)."),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

/// Rebuild the status projections and summary for a stored document.
pub fn cmd_regen_projections(dir: &Path, project: Option<String>) {
    let store = open_store(dir);
    match store.regenerate_projections(&project.unwrap_or_default()) {
        Ok(count) => println!("Rebuilt {count} status projection(s)."),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

/// Run automation over every record in a document file and write the
/// result back. Records that are not task-shaped are left untouched.
pub fn cmd_enrich(file: &Path, creator: &str) {
    let text = match fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", file.display());
            std::process::exit(1);
        }
    };
    let mut doc: Value = match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{} is not valid JSON: {e}", file.display());
            std::process::exit(1);
        }
    };
    let Some(items) = document_tasks(&doc) else {
        eprintln!("{} does not contain a task list.", file.display());
        std::process::exit(1);
    };
    let items = items.clone();

    let mut enriched: Vec<Task> = Vec::new();
    let mut rebuilt: Vec<Value> = Vec::new();
    let mut untouched = 0usize;
    for (i, item) in items.into_iter().enumerate() {
        match Task::from_value(item.clone()) {
            Ok(draft) => {
                let task = auto_populate_task(draft, &enriched, creator);
                rebuilt.push(task.to_value());
                enriched.push(task);
            }
            Err(e) => {
                eprintln!("Warning: record {} left untouched: {e}", i + 1);
                rebuilt.push(item);
                untouched += 1;
            }
        }
    }
    let count = enriched.len();

    match &mut doc {
        Value::Object(map) => {
            if let Some(project_value) = map.get("project").cloned() {
                if let Ok(project) = serde_json::from_value::<ProjectInfo>(project_value) {
                    let filled = auto_populate_project(project);
                    if let Ok(value) = serde_json::to_value(&filled) {
                        map.insert("project".to_string(), value);
                    }
                }
            }
            map.insert("tasks".to_string(), Value::Array(rebuilt));
        }
        _ => doc = Value::Array(rebuilt),
    }

    let text = match serde_json::to_string_pretty(&doc) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to serialise {}: {e}", file.display());
            std::process::exit(1);
        }
    };
    if let Err(e) = atomic_write(file, &text) {
        eprintln!("Failed to write {}: {e}", file.display());
        std::process::exit(1);
    }
    if untouched == 0 {
        println!("Enriched {count} task(s) in {}.", file.display());
    } else {
        println!(
            "Enriched {count} task(s) in {} ({untouched} left untouched).",
            file.display()
        );
    }
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

/// Create a timestamped backup of the local task file.
pub fn create_backup(db_path: &Path) -> Result<String, std::io::Error> {
    if !db_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "task file does not exist",
        ));
    }

    let parent_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    let backup_dir = parent_dir.join("backup");
    fs::create_dir_all(&backup_dir)?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let db_filename = db_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tasks.json");
    let backup_path = backup_dir.join(format!("{timestamp}_{db_filename}"));
    fs::copy(db_path, &backup_path)?;

    Ok(backup_path.to_string_lossy().to_string())
}

/// Load the collection and surface any records that fail validation.
/// They stay loaded; a later save will refuse them.
fn load_and_report(db: &mut TaskDb) -> LoadReport {
    let report = db.load_tasks();
    for (label, errors) in &report.invalid {
        eprintln!("Warning: {label} fails validation: {}", errors.join("; "));
    }
    report
}

/// Persist the collection, mapping every failure mode onto stderr.
fn save_or_exit(db: &mut TaskDb, message: &str, report: &LoadReport) {
    match db.save_tasks(message, report.revision.as_ref()) {
        Ok(_) => {}
        Err(SaveError::Invalid(failures)) => {
            for (label, errors) in failures {
                eprintln!("{label}: {}", errors.join("; "));
            }
            eprintln!("Save aborted; the collection still holds invalid records.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to save tasks: {e}");
            std::process::exit(1);
        }
    }
}

fn resolve_or_exit(identifier: &str, db: &TaskDb) -> u64 {
    match resolve_task_identifier(identifier, db) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error resolving task: {e}");
            std::process::exit(1);
        }
    }
}

/// Print validation failures and bail.
fn fail_validation(errors: Vec<String>) -> ! {
    for error in errors {
        eprintln!("{error}");
    }
    std::process::exit(1)
}

fn open_store(dir: &Path) -> DocumentStore {
    match DocumentStore::with_base_dir(dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open store directory {}: {e}", dir.display());
            std::process::exit(1);
        }
    }
}

/// Parse repeated field=value assignments. Values parse as JSON where
/// possible so numbers, booleans and arrays come through typed.
fn parse_overrides(pairs: &[String]) -> Result<Map<String, Value>, String> {
    let mut map = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(format!("'{pair}' is not a field=value assignment"));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("'{pair}' has an empty field name"));
        }
        let raw = raw.trim();
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Split repeated, possibly comma-separated tag arguments into a
/// trimmed, de-duplicated list.
fn split_tags(raw: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.iter()
        .flat_map(|s| s.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Parse a name:email:role assignment into a worker record. Missing
/// parts come through empty and fall to the validator.
fn worker_value(spec: &str) -> Value {
    let mut parts = spec.splitn(3, ':');
    let name = parts.next().unwrap_or("").trim();
    let email = parts.next().unwrap_or("").trim();
    let role = parts.next().unwrap_or("").trim();
    json!({ "name": name, "email": email, "role": role })
}

fn id_key(task: &Task) -> u64 {
    task.task_id.unwrap_or(u64::MAX)
}

fn priority_rank(task: &Task) -> usize {
    match task.priority_enum() {
        Some(TaskPriority::Critical) => 0,
        Some(TaskPriority::High) => 1,
        Some(TaskPriority::Medium) => 2,
        Some(TaskPriority::Low) => 3,
        None => 4,
    }
}

fn status_rank(task: &Task) -> usize {
    match task.status_enum() {
        Some(status) => TaskStatus::ALL
            .iter()
            .position(|s| *s == status)
            .unwrap_or(TaskStatus::ALL.len()),
        None => TaskStatus::ALL.len(),
    }
}

fn print_table(tasks: &[&Task]) {
    // Header.
    println!(
        "{:<5} {:<12} {:<9} {:<11} {:<11} {:>4} {}",
        "ID", "Status", "Pri", "Start", "End", "%", "Name [tags]"
    );
    for t in tasks {
        let tags = if t.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", t.tags.join(","))
        };
        println!(
            "{:<5} {:<12} {:<9} {:<11} {:<11} {:>4} {}{}",
            t.task_id.map(|i| i.to_string()).unwrap_or_else(|| "-".into()),
            truncate(t.status.as_deref().unwrap_or("-"), 12),
            truncate(t.priority.as_deref().unwrap_or("-"), 9),
            t.start_date.as_deref().unwrap_or("-"),
            t.end_date.as_deref().unwrap_or("-"),
            t.progress_percentage
                .map(|p| format!("{p:.0}"))
                .unwrap_or_else(|| "-".into()),
            t.task_name.as_deref().unwrap_or("-"),
            tags
        );
    }
}

/// Truncate with ellipsis for display purposes.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}
