//! Backlogg planner backend.
//!
//! Serves the task API for the board UI, or runs a one-shot scheduling
//! pass from the command line.

use anyhow::Result;
use backlogg::api::{AppState, serve};
use backlogg::config::Config;
use backlogg::db::Database;
use backlogg::plan::run_plan;
use backlogg::service::MutationService;
use backlogg::types::OwnerScope;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "backlogg", version, about = "Personal task planner backend")]
struct Cli {
    /// Path to a config file (defaults to .backlogg/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the database path
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server (the default)
    Serve {
        /// Override the bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one scheduling pass for an owner and print the report
    Plan {
        /// Owner whose tasks to plan
        #[arg(long)]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    if let Some(db_path) = cli.db {
        config.server.db_path = db_path;
    }

    config.ensure_db_dir()?;
    let db = Arc::new(Database::open(&config.server.db_path)?);
    info!(db_path = %config.server.db_path.display(), "database opened");

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or(config.server.bind.clone());
            let state = AppState::new(
                Arc::clone(&db),
                Duration::from_millis(config.schedule.plan_delay_ms),
            );
            serve(state, &bind).await
        }
        Command::Plan { owner } => {
            let service = MutationService::new(Arc::clone(&db), OwnerScope::user(owner));
            let outcome = run_plan(db.as_ref(), &service, chrono::Utc::now()).await?;

            let failures: Vec<_> = outcome
                .report
                .failures
                .iter()
                .map(|(task_id, error)| {
                    serde_json::json!({ "task_id": task_id, "error": error })
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "scanned": outcome.scanned,
                    "updated": outcome.report.updated,
                    "skipped": outcome.report.skipped,
                    "missing": outcome.report.missing,
                    "failures": failures,
                })
            );
            Ok(())
        }
    }
}
