//! # haiku-index
//!
//! Indexes Claude Code chat logs (JSONL transcripts under ~/.claude/projects/)
//! into a SQLite store and answers lookups against it.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────┐     ┌──────────┐     ┌───────────┐     ┌──────────────┐
//! │  discovery  │────▶│  parser  │────▶│ assembler │────▶│ store writer │
//! │ (ingest.rs) │     │          │     │           │     │  (SQLite)    │
//! └─────────────┘     └──────────┘     └───────────┘     └──────────────┘
//!                                                               │
//!                          search / view / export ◀─────────────┘
//! ```
//!
//! ## Commands
//!
//! - `haiku ingest projects [NAME...]` - largest session log per named project
//! - `haiku ingest recent [--since DATE]` - history.jsonl plus recent logs
//! - `haiku search <query>` - search conversation metadata
//! - `haiku view <id>` - show one conversation
//! - `haiku search-message <query>` - search individual messages
//! - `haiku list-projects` - conversation counts per project
//! - `haiku export <id>` - full text framed for pasting

mod assembler;
mod commands;
mod config;
mod error;
mod ingest;
mod keywords;
mod parser;
mod sessions;
mod store;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::IndexConfig;
use crate::ingest::{Discovery, Ingestor};
use crate::store::Store;

#[derive(Parser)]
#[command(name = "haiku", version, about = "Searchable index of Claude Code conversations")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "HAIKU_DB", global = true)]
    db: Option<PathBuf>,
    /// Claude Code projects directory
    #[arg(long, env = "HAIKU_PROJECTS_DIR", global = true)]
    projects_dir: Option<PathBuf>,
    /// Global prompt history file
    #[arg(long, env = "HAIKU_HISTORY_FILE", global = true)]
    history_file: Option<PathBuf>,
    /// Prefix joined to project names to find their directories
    #[arg(long, env = "HAIKU_PROJECT_PREFIX", global = true)]
    project_prefix: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Index chat logs into the database
    Ingest {
        /// Clear every indexed row before ingesting
        #[arg(long)]
        reset: bool,
        #[command(subcommand)]
        source: IngestSource,
    },
    /// Search conversation metadata (fast)
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// View a full conversation
    View { id: String },
    /// Search individual messages
    SearchMessage {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// List projects with conversation counts
    ListProjects,
    /// Print a conversation framed for pasting into a chat window
    Export { id: String },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Largest session log of each named project (defaults to the Q-series)
    Projects { names: Vec<String> },
    /// history.jsonl plus every session log modified since a date
    Recent {
        /// Cutoff date (YYYY-MM-DD), defaults to 2026-02-01
        #[arg(long)]
        since: Option<NaiveDate>,
    },
}

impl Cli {
    fn config(&self) -> IndexConfig {
        let mut config = IndexConfig::default();
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(dir) = &self.projects_dir {
            config.projects_dir = dir.clone();
        }
        if let Some(file) = &self.history_file {
            config.history_file = file.clone();
        }
        if let Some(prefix) = &self.project_prefix {
            config.project_prefix = prefix.clone();
        }
        config
    }
}

impl IngestSource {
    fn discovery(self) -> Discovery {
        match self {
            IngestSource::Projects { names } if names.is_empty() => Discovery::Projects(
                config::DEFAULT_PROJECTS.iter().map(|p| p.to_string()).collect(),
            ),
            IngestSource::Projects { names } => Discovery::Projects(names),
            IngestSource::Recent { since } => Discovery::Recent {
                since: since
                    .map(config::start_of_day)
                    .unwrap_or_else(config::default_recent_since),
            },
        }
    }
}

fn open_store(config: &IndexConfig) -> Result<Store> {
    Store::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config();
    let command = match cli.command {
        Some(command) => command,
        None => {
            Cli::command().print_help()?;
            return Ok(());
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Ingest { reset, source } => {
            let mut store = open_store(&config)?;
            if reset {
                store.clear().context("failed to clear database")?;
                tracing::info!("Cleared indexed data in {}", config.db_path.display());
            }
            let discovery = source.discovery();
            tracing::info!("Starting ingest: {:?}", discovery);
            let discovered = ingest::discover(&config, &discovery);
            let report = Ingestor::new(&mut store).run(discovered);
            commands::ingest_summary(&report, &mut out)?;
            out.flush()?;
            let verification = store.verification().context("failed to verify database")?;
            commands::verification_summary(&verification, &mut out)?;
        }
        Command::Search { query } => {
            let store = open_store(&config)?;
            commands::search(&store, &query.join(" "), &mut out)?;
        }
        Command::View { id } => {
            let store = open_store(&config)?;
            commands::view(&store, &id, &mut out)?;
        }
        Command::SearchMessage { query } => {
            let store = open_store(&config)?;
            commands::search_messages(&store, &query.join(" "), &mut out)?;
        }
        Command::ListProjects => {
            let store = open_store(&config)?;
            commands::list_projects(&store, &mut out)?;
        }
        Command::Export { id } => {
            let store = open_store(&config)?;
            commands::export(&store, &id, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("haiku=info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
