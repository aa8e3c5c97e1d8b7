//! Paths and defaults for the indexer.
//!
//! Defaults follow the Claude Code layout under `$HOME`; every value can be
//! overridden from the command line or the matching `HAIKU_*` variable.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::path::PathBuf;

/// Directory prefix Claude Code gives project folders under /var/www/html
pub const DEFAULT_PROJECT_PREFIX: &str = "-var-www-html-";

/// Projects ingested when no explicit list or recency window is requested
pub const DEFAULT_PROJECTS: &[&str] = &["Q10", "Q11", "Q12", "Q14", "Q18", "Q19", "Q21"];

/// Start of the default recency window for directory-walk discovery
pub const DEFAULT_RECENT_SINCE: (i32, u32, u32) = (2026, 2, 1);

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    /// Claude Code projects dir: ~/.claude/projects/
    pub projects_dir: PathBuf,
    /// Global prompt history: ~/.claude/history.jsonl
    pub history_file: PathBuf,
    /// Prefix joined to a project name to find its directory
    pub project_prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/home/user".to_string());
        let claude = PathBuf::from(&home).join(".claude");
        Self {
            db_path: PathBuf::from(&home).join(".haiku-index").join("haiku.db"),
            projects_dir: claude.join("projects"),
            history_file: claude.join("history.jsonl"),
            project_prefix: DEFAULT_PROJECT_PREFIX.to_string(),
        }
    }
}

impl IndexConfig {
    /// Project directory for a named project, e.g. Q19 -> .../-var-www-html-Q19
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.projects_dir.join(format!("{}{}", self.project_prefix, project))
    }

    /// Project name from a project directory name, stripping the prefix when
    /// present and otherwise keeping the last dash-separated segment
    pub fn project_from_dir_name(&self, dir_name: &str) -> Option<String> {
        let name = match dir_name.strip_prefix(&self.project_prefix) {
            Some(rest) => rest,
            None => dir_name.rsplit('-').next().unwrap_or(dir_name),
        };
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

pub fn default_recent_since() -> DateTime<Utc> {
    let (y, m, d) = DEFAULT_RECENT_SINCE;
    NaiveDate::from_ymd_opt(y, m, d)
        .map(start_of_day)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
