//! Ingest orchestrator.
//!
//! Discovers source files, then for each file in turn runs
//! parser -> assembler -> store. Everything is sequential: one file is fully
//! flushed before the next is opened, one conversation fully written before
//! the next. Counts are accumulated in an [`IngestReport`] and returned.
//!
//! Discovery strategies:
//! - `Projects`: fixed project names, largest JSONL file per project dir
//! - `Recent`: ~/.claude/history.jsonl plus every JSONL under the projects
//!   dir modified at or after a cutoff

use crate::assembler::assemble;
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::parser::{records, FieldMapping};
use crate::sessions::Conversation;
use crate::store::{Store, WriteOutcome};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How to find source files
#[derive(Debug, Clone)]
pub enum Discovery {
    Projects(Vec<String>),
    Recent { since: DateTime<Utc> },
}

/// One file queued for ingestion
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub mapping: FieldMapping,
    /// Project name implied by where the file lives
    pub project_hint: Option<String>,
    /// Short label for reporting (project name or file name)
    pub label: String,
    pub size_bytes: u64,
}

/// Discovery output: files to ingest plus labels that turned up nothing
#[derive(Debug, Default)]
pub struct Discovered {
    pub files: Vec<SourceFile>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FileReport {
    pub label: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub conversations: usize,
    pub messages: usize,
    pub messages_inserted: usize,
    pub failed_conversations: usize,
    pub skipped_records: usize,
    pub elapsed: Duration,
    /// Set when the file could not be read at all
    pub error: Option<String>,
}

impl FileReport {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0 / 1024.0
    }
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: Vec<FileReport>,
    pub missing: Vec<String>,
}

impl IngestReport {
    pub fn total_conversations(&self) -> usize {
        self.files.iter().map(|f| f.conversations).sum()
    }

    pub fn total_messages(&self) -> usize {
        self.files.iter().map(|f| f.messages).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.files
            .iter()
            .map(|f| f.failed_conversations + usize::from(f.error.is_some()))
            .sum()
    }
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "jsonl")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Largest JSONL file directly inside `dir`
fn largest_jsonl(dir: &Path) -> Option<(PathBuf, u64)> {
    fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_jsonl(path))
        .filter_map(|path| {
            let size = fs::metadata(&path).ok()?.len();
            Some((path, size))
        })
        .max_by_key(|(_, size)| *size)
}

/// Recursively collect JSONL files modified at or after `since`.
/// Unreadable directories are skipped.
fn walk_recent(dir: &Path, since: DateTime<Utc>, out: &mut Vec<(PathBuf, u64)>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping unreadable dir {}: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        // Symlinked directories are not followed
        let is_dir = entry.file_type().map_or(false, |t| t.is_dir());
        if is_dir {
            walk_recent(&path, since, out);
            continue;
        }
        if !is_jsonl(&path) {
            continue;
        }
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified: Option<DateTime<Utc>> = meta.modified().ok().map(DateTime::<Utc>::from);
        if modified.map_or(false, |m| m >= since) {
            out.push((path, meta.len()));
        }
    }
}

/// Name of the top-level project directory holding `path`, if any
fn project_dir_name(projects_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(projects_dir).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    components.next()?;
    first.as_os_str().to_str().map(str::to_string)
}

pub fn discover(config: &IndexConfig, discovery: &Discovery) -> Discovered {
    let mut found = Discovered::default();
    match discovery {
        Discovery::Projects(names) => {
            for name in names {
                let dir = config.project_dir(name);
                match largest_jsonl(&dir) {
                    Some((path, size_bytes)) => found.files.push(SourceFile {
                        path,
                        mapping: FieldMapping::Session,
                        project_hint: Some(name.clone()),
                        label: name.clone(),
                        size_bytes,
                    }),
                    None => {
                        info!("{}: no JSONL files in {}", name, dir.display());
                        found.missing.push(name.clone());
                    }
                }
            }
        }
        Discovery::Recent { since } => {
            if let Ok(meta) = fs::metadata(&config.history_file) {
                found.files.push(SourceFile {
                    path: config.history_file.clone(),
                    mapping: FieldMapping::History,
                    project_hint: None,
                    label: file_name(&config.history_file),
                    size_bytes: meta.len(),
                });
            }

            if !config.projects_dir.exists() {
                info!("Projects directory does not exist: {}", config.projects_dir.display());
            }
            let mut walked = Vec::new();
            walk_recent(&config.projects_dir, *since, &mut walked);
            walked.sort();
            for (path, size_bytes) in walked {
                let project_hint = project_dir_name(&config.projects_dir, &path)
                    .and_then(|n| config.project_from_dir_name(&n));
                found.files.push(SourceFile {
                    label: file_name(&path),
                    path,
                    mapping: FieldMapping::Session,
                    project_hint,
                    size_bytes,
                });
            }
        }
    }
    found
}

/// Ingestion context: holds the store handle for the length of a run
pub struct Ingestor<'a> {
    store: &'a mut Store,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    pub fn run(&mut self, discovered: Discovered) -> IngestReport {
        info!("Ingesting {} file(s)", discovered.files.len());
        let mut report = IngestReport {
            files: Vec::with_capacity(discovered.files.len()),
            missing: discovered.missing,
        };
        for source in &discovered.files {
            report.files.push(self.ingest_file(source));
        }
        info!(
            "Ingest complete: {} conversations, {} messages, {} failures",
            report.total_conversations(),
            report.total_messages(),
            report.total_failures()
        );
        report
    }

    /// Parse, assemble and write one file. Never fails: read errors and
    /// per-conversation write errors are recorded in the report.
    pub fn ingest_file(&mut self, source: &SourceFile) -> FileReport {
        let started = Instant::now();
        let mut report = FileReport {
            label: source.label.clone(),
            path: source.path.clone(),
            size_bytes: source.size_bytes,
            ..FileReport::default()
        };

        let file = match File::open(&source.path).map_err(|e| IndexError::io(&source.path, e)) {
            Ok(f) => f,
            Err(e) => {
                warn!("{}", e);
                report.error = Some(e.to_string());
                report.elapsed = started.elapsed();
                return report;
            }
        };

        let ingest_time = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut non_messages = 0;
        let messages = records(BufReader::new(file), source.mapping).filter_map(|record| {
            let message = record.into_message();
            if message.is_none() {
                non_messages += 1;
            }
            message
        });
        let assembly = assemble(messages, &ingest_time);
        report.skipped_records = non_messages + assembly.empty_dropped;
        debug!(
            "{}: assembled {} messages in {} conversations",
            source.label,
            assembly.message_count(),
            assembly.conversations.len()
        );

        for conversation in assembly.conversations.values() {
            match self.write(conversation, source.project_hint.as_deref()) {
                Ok(outcome) => {
                    report.conversations += 1;
                    report.messages += conversation.messages.len();
                    report.messages_inserted += outcome.messages_inserted;
                }
                Err(e) => {
                    warn!("Failed to write conversation {}: {}", conversation.id, e);
                    report.failed_conversations += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        debug!(
            "{}: {} conversations, {} messages ({} new) in {:?}",
            report.label, report.conversations, report.messages, report.messages_inserted, report.elapsed
        );
        report
    }

    fn write(&mut self, conversation: &Conversation, hint: Option<&str>) -> Result<WriteOutcome> {
        self.store.write_conversation(conversation, hint)
    }
}
