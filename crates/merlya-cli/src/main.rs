//! `merlya`: the interactive shell binary.
//!
//! Grounded stylistically in `aivcs-cli::main` (clap parsing, `init_tracing`
//! before anything else), but structured as a long-running REPL instead of
//! a one-shot subcommand dispatch — the shell surfaces slash-commands and
//! free-text requests over the same session instead of exiting after one.

mod commands;
mod llm_stub;
mod repl;
mod state;

use std::path::PathBuf;

use clap::Parser;
use merlya_store::{ConversationStore, JsonStore, SqliteStore};
use tracing::Level;

#[derive(Parser)]
#[command(name = "merlya")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Merlya — an interactive infrastructure operations assistant", long_about = None)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines.
    #[arg(long)]
    json: bool,

    /// Use the SQLite conversation store instead of the JSON-file one.
    #[arg(long)]
    sqlite: bool,

    /// Conversation store location (a directory for the JSON backend, a
    /// database file for the SQLite one). Defaults under `~/.merlya`.
    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Directory of user-authored skill YAML files. Defaults to
    /// `~/.merlya/skills`.
    #[arg(long)]
    skills_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    merlya_core::telemetry::init_tracing(cli.json, level);

    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let merlya_home = home.join(".merlya");

    let store: Box<dyn ConversationStore> = if cli.sqlite {
        let db_path = cli.storage_path.unwrap_or_else(|| merlya_home.join("sessions.db"));
        tracing::info!(path = %db_path.display(), "using SQLite conversation store");
        Box::new(SqliteStore::new(&db_path).await?)
    } else {
        let dir = cli.storage_path.unwrap_or_else(|| merlya_home.join("conversations"));
        tracing::info!(path = %dir.display(), "using JSON conversation store");
        Box::new(JsonStore::new(&dir).await?)
    };

    let state = state::AppState::new(store, cli.skills_dir).await?;
    repl::run(state).await
}
