//! CSV encoding and decoding for task collections.
//!
//! Two encodings share one column vocabulary: the 16-column snapshot
//! written alongside the canonical document, and the 21-column full
//! export that adds the nested collections. Every declared column is
//! always emitted; absent values are empty cells.
//!
//! Nested collections flatten to delimited cells: workers as
//! `name:email:role` joined with `|`, dependencies as
//! `predecessor::type::lag`, comments as `author::timestamp::text`,
//! attachments as `filename::url::uploader::date`, the last three and
//! tags joined with `;`. Import reverses each encoding exactly.

use std::collections::HashMap;

use thiserror::Error;

use crate::fields::{EXPORT_COLUMNS, SNAPSHOT_COLUMNS};
use crate::task::{AssignedWorker, Attachment, Comment, Dependency, Predecessor, Task};

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("csv input is empty")]
    Empty,
    #[error("csv header is missing the {0} column")]
    Header(&'static str),
}

/// Render the 16-column snapshot written next to the canonical document.
pub fn snapshot_csv(tasks: &[Task]) -> String {
    render(tasks, SNAPSHOT_COLUMNS)
}

/// Render the full 21-column export including nested collections.
pub fn export_csv(tasks: &[Task]) -> String {
    render(tasks, EXPORT_COLUMNS)
}

fn render(tasks: &[Task], columns: &[&str]) -> String {
    let mut out = String::new();
    out.push_str(&columns.join(","));
    out.push('\n');
    for task in tasks {
        let row: Vec<String> = columns
            .iter()
            .map(|column| escape_csv(&cell_value(task, column)))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Decode tasks from CSV text. The first non-blank record is the header;
/// columns are matched by name so snapshot and full exports both import.
pub fn import_tasks(text: &str) -> Result<Vec<Task>, CsvError> {
    let mut records = parse_records(text)
        .into_iter()
        .filter(|r| !is_blank_record(r));
    let header = records.next().ok_or(CsvError::Empty)?;
    let index: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();
    if !index.contains_key("task_name") {
        return Err(CsvError::Header("task_name"));
    }

    Ok(records.map(|row| task_from_row(&row, &index)).collect())
}

/// Quote a cell when it contains a delimiter, a quote or a line break;
/// internal quotes are doubled.
pub fn escape_csv(value: &str) -> String {
    if value.contains('"') || value.contains(',') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split CSV text into records of fields, honouring quotes. Quoted cells
/// may span line breaks; `""` inside quotes unescapes to one quote.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => record.push(std::mem::take(&mut field)),
                '\r' => {}
                '\n' => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                _ => field.push(c),
            }
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

fn is_blank_record(record: &[String]) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

fn cell_value(task: &Task, column: &str) -> String {
    let opt_str = |v: &Option<String>| v.clone().unwrap_or_default();
    let opt_num = |v: &Option<f64>| v.map(|n| trim_float(n)).unwrap_or_default();
    match column {
        "task_id" => task.task_id.map(|id| id.to_string()).unwrap_or_default(),
        "task_name" => opt_str(&task.task_name),
        "description" => opt_str(&task.description),
        "start_date" => opt_str(&task.start_date),
        "end_date" => opt_str(&task.end_date),
        "priority" => opt_str(&task.priority),
        "status" => opt_str(&task.status),
        "progress_percentage" => opt_num(&task.progress_percentage),
        "estimated_hours" => opt_num(&task.estimated_hours),
        "actual_hours" => opt_num(&task.actual_hours),
        "is_critical_path" => task
            .is_critical_path
            .map(|b| b.to_string())
            .unwrap_or_default(),
        "category_name" => opt_str(&task.category_name),
        "parent_task_id" => task
            .parent_task_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
        "creator_id" => opt_str(&task.creator_id),
        "created_date" => opt_str(&task.created_date),
        "completed_date" => opt_str(&task.completed_date),
        "tags" => task.tags.join(";"),
        "assigned_workers" => task
            .assigned_workers
            .iter()
            .map(|w| format!("{}:{}:{}", w.name, w.email, w.role))
            .collect::<Vec<_>>()
            .join("|"),
        "dependencies" => task
            .dependencies
            .iter()
            .map(|d| format!("{}::{}::{}", d.predecessor, d.dependency_type, d.lag_days))
            .collect::<Vec<_>>()
            .join(";"),
        "comments" => task
            .comments
            .iter()
            .map(|c| format!("{}::{}::{}", c.author, c.timestamp, c.text))
            .collect::<Vec<_>>()
            .join(";"),
        "attachments" => task
            .attachments
            .iter()
            .map(|a| format!("{}::{}::{}::{}", a.filename, a.url, a.uploaded_by, a.upload_date))
            .collect::<Vec<_>>()
            .join(";"),
        _ => String::new(),
    }
}

fn trim_float(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn task_from_row(row: &[String], index: &HashMap<String, usize>) -> Task {
    let cell = |name: &str| {
        index
            .get(name)
            .and_then(|&i| row.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    };
    let text = |name: &str| cell(name).map(str::to_string);

    Task {
        task_id: cell("task_id").and_then(|s| s.parse().ok()),
        task_name: text("task_name"),
        description: text("description"),
        start_date: text("start_date"),
        end_date: text("end_date"),
        priority: text("priority"),
        status: text("status"),
        progress_percentage: cell("progress_percentage").and_then(|s| s.parse().ok()),
        estimated_hours: cell("estimated_hours").and_then(|s| s.parse().ok()),
        actual_hours: cell("actual_hours").and_then(|s| s.parse().ok()),
        is_critical_path: cell("is_critical_path").and_then(parse_flag),
        category_name: text("category_name"),
        parent_task_id: cell("parent_task_id").and_then(|s| s.parse().ok()),
        creator_id: text("creator_id"),
        created_date: text("created_date"),
        completed_date: text("completed_date"),
        tags: cell("tags").map(decode_tags).unwrap_or_default(),
        assigned_workers: cell("assigned_workers")
            .map(decode_workers)
            .unwrap_or_default(),
        dependencies: cell("dependencies")
            .map(decode_dependencies)
            .unwrap_or_default(),
        comments: cell("comments").map(decode_comments).unwrap_or_default(),
        attachments: cell("attachments")
            .map(decode_attachments)
            .unwrap_or_default(),
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn decode_tags(cell: &str) -> Vec<String> {
    cell.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn decode_workers(cell: &str) -> Vec<AssignedWorker> {
    cell.split('|')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            AssignedWorker {
                name: parts.next().unwrap_or("").trim().to_string(),
                email: parts.next().unwrap_or("").trim().to_string(),
                role: parts.next().unwrap_or("").trim().to_string(),
            }
        })
        .collect()
}

fn decode_dependencies(cell: &str) -> Vec<Dependency> {
    cell.split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, "::");
            let predecessor = Predecessor::parse(parts.next().unwrap_or(""));
            let dependency_type = parts.next().unwrap_or("").trim().to_string();
            let lag_days = parts
                .next()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
            Dependency {
                predecessor,
                dependency_type,
                lag_days,
            }
        })
        .collect()
}

fn decode_comments(cell: &str) -> Vec<Comment> {
    cell.split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, "::");
            Comment {
                author: parts.next().unwrap_or("").trim().to_string(),
                timestamp: parts.next().unwrap_or("").trim().to_string(),
                text: parts.next().unwrap_or("").to_string(),
            }
        })
        .collect()
}

fn decode_attachments(cell: &str) -> Vec<Attachment> {
    cell.split(';')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(4, "::");
            Attachment {
                filename: parts.next().unwrap_or("").trim().to_string(),
                url: parts.next().unwrap_or("").trim().to_string(),
                uploaded_by: parts.next().unwrap_or("").trim().to_string(),
                upload_date: parts.next().unwrap_or("").trim().to_string(),
            }
        })
        .collect()
}
