use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// File-backed task tracker CLI.
/// Storage defaults to ./tasks.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "tasktrack", version, about = "File-backed task tracking CLI")]
pub struct Cli {
    /// Path to the JSON task file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to a project config file supplying document defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory of a file-backed remote store to sync against.
    #[arg(long, global = true)]
    pub remote: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}
