//! # tasktrack - task tracking data engine
//!
//! A command-line data engine for project task documents: schema
//! validation, automation of derived fields, CSV interchange and a
//! file-backed persistence service with per-status projections.
//!
//! ## Key Features
//!
//! - **Lenient records, strict gate**: documents load whatever is on
//!   disk, and every mutation revalidates before anything is persisted
//! - **Automation**: ids, defaults, spelling normalisation and
//!   completion coupling applied on create, update and import
//! - **CSV interchange**: a 16-column snapshot and a 21-column full
//!   export, both reimportable
//! - **Optimistic concurrency**: saves carry the revision token the
//!   load observed, so a concurrent writer surfaces as a conflict
//!   instead of a lost update
//! - **Persistence service**: GET/PUT of whole documents over HTTP with
//!   derived artifacts rebuilt on every accepted write
//!
//! ## Quick Start
//!
//! ```bash
//! # Add a task
//! tasktrack add "Design the schema" --end 2025-03-14 --priority High
//!
//! # List open work
//! tasktrack list --status "In Progress"
//!
//! # Mark it done (progress and completion date follow)
//! tasktrack complete "Design the schema"
//!
//! # Serve documents to other tools
//! tasktrack serve --dir store --addr 127.0.0.1:7878
//! ```
//!
//! Data lives in a single JSON document (default `./tasks.json`).
//! `--remote <dir>` layers a file-backed store with revision tracking
//! on top, and `serve` exposes stored documents over HTTP together with
//! their CSV snapshots and status projections.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod automation;
pub mod cli;
pub mod cmd;
pub mod csv;
pub mod db;
pub mod docstore;
pub mod fields;
pub mod project;
pub mod remote;
pub mod service;
pub mod task;
pub mod validate;

use cli::Cli;
use cmd::*;
use db::{TaskDb, TaskFilter};
use project::ProjectConfig;
use remote::{FileStore, RemoteStore};

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "task_tracker=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Commands that operate on on-disk documents directly.
    match &cli.command {
        Commands::Serve { addr, dir } => {
            cmd_serve(addr, dir);
            return;
        }
        Commands::Validate { file } => {
            cmd_validate(file);
            return;
        }
        Commands::RegenCsv { dir, project } => {
            cmd_regen_csv(dir, project.clone());
            return;
        }
        Commands::RegenProjections { dir, project } => {
            cmd_regen_projections(dir, project.clone());
            return;
        }
        Commands::Enrich { file, creator } => {
            cmd_enrich(file, creator);
            return;
        }
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            return;
        }
        _ => {}
    }

    // Everything else runs against the shared task database.
    let db_path = cli.db.clone().unwrap_or_else(|| PathBuf::from("tasks.json"));
    let config = match cli.config.as_deref() {
        Some(path) => ProjectConfig::load(path),
        None => ProjectConfig::default(),
    };
    let remote: Option<Box<dyn RemoteStore>> = match cli.remote.as_deref() {
        Some(dir) => match FileStore::with_base_dir(dir) {
            Ok(store) => Some(Box::new(store)),
            Err(e) => {
                eprintln!("Failed to open remote store {}: {e}", dir.display());
                std::process::exit(1);
            }
        },
        None => None,
    };
    let mut db = TaskDb::new(db_path, config, remote);

    match cli.command {
        Commands::Add {
            name, description, start, end, priority, status, category, parent, tags,
            assignees, estimated_hours, critical, creator,
        } => cmd_add(
            &mut db, name, description, start, end, priority, status, category, parent,
            tags, assignees, estimated_hours, critical, creator,
        ),

        Commands::List { status, priority, category, assignee, search, sort, limit } => {
            let filter = TaskFilter { status, priority, category, assignee, search };
            cmd_list(&mut db, filter, sort, limit);
        }

        Commands::View { id } => cmd_view(&mut db, id),

        Commands::Update { id, sets } => cmd_update(&mut db, id, sets),

        Commands::Complete { id } => cmd_complete(&mut db, id),

        Commands::Delete { id } => cmd_delete(&mut db, id),

        Commands::Export { output } => cmd_export(&mut db, output),

        Commands::Import { input, merge, skip_invalid, no_backup } =>
            cmd_import(&mut db, input, merge, skip_invalid, no_backup),

        Commands::Template { action } => cmd_template(&mut db, action),

        Commands::Summary { json } => cmd_summary(&mut db, json),

        Commands::MatchWorkers { id, limit } => cmd_match_workers(&mut db, id, limit),

        Commands::Serve { .. }
        | Commands::Validate { .. }
        | Commands::RegenCsv { .. }
        | Commands::RegenProjections { .. }
        | Commands::Enrich { .. }
        | Commands::Completions { .. } => unreachable!("handled above"),
    }
}
