//! Console rendering for the query and ingest commands.
//!
//! Each command writes to any `io::Write` so output can be captured in tests.
//! Lookups that miss print a message and succeed.

use crate::ingest::IngestReport;
use crate::store::{Store, Verification};
use anyhow::Result;
use std::io::Write;

const PREVIEW_CHARS: usize = 100;
const RULE_WIDTH: usize = 60;

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn search(store: &Store, query: &str, out: &mut impl Write) -> Result<()> {
    let hits = store.search_metadata(query)?;
    if hits.is_empty() {
        writeln!(out, "No results found for \"{}\"", query)?;
        return Ok(());
    }
    writeln!(out, "Found {} result(s):\n", hits.len())?;
    for (idx, hit) in hits.iter().enumerate() {
        writeln!(
            out,
            "[{}] {} | {} | {} | {} messages",
            idx + 1,
            hit.conversation_id,
            hit.project,
            hit.date,
            hit.message_count
        )?;
        writeln!(out, "    Title: {}", hit.title)?;
        writeln!(out, "    Status: {}", hit.status)?;
        writeln!(out, "    {}\n", hit.summary)?;
    }
    Ok(())
}

pub fn view(store: &Store, id: &str, out: &mut impl Write) -> Result<()> {
    let meta = match store.metadata(id)? {
        Some(meta) => meta,
        None => {
            writeln!(out, "Conversation {} not found", id)?;
            return Ok(());
        }
    };

    writeln!(out, "\n=== Conversation: {} ===", id)?;
    writeln!(out, "Project: {}", meta.project)?;
    writeln!(out, "Date: {}", meta.date)?;
    writeln!(out, "Title: {}", meta.title)?;
    writeln!(out, "Messages: {}", meta.message_count)?;
    writeln!(out, "Status: {}", meta.status)?;
    writeln!(out, "Has TODOs: {}", if meta.has_todos { "yes" } else { "no" })?;
    let topics = if meta.key_topics.is_empty() { "None" } else { meta.key_topics.as_str() };
    writeln!(out, "Topics: {}", topics)?;
    writeln!(out, "\n---\n")?;
    if let Some(text) = store.full_text(id)? {
        writeln!(out, "{}", text)?;
    }
    writeln!(out, "\n---\n")?;
    Ok(())
}

pub fn search_messages(store: &Store, query: &str, out: &mut impl Write) -> Result<()> {
    let hits = store.search_messages(query)?;
    if hits.is_empty() {
        writeln!(out, "No messages found containing \"{}\"", query)?;
        return Ok(());
    }
    writeln!(out, "Found {} message(s):\n", hits.len())?;
    for (idx, hit) in hits.iter().enumerate() {
        writeln!(out, "[{}] In conversation: {}", idx + 1, hit.conversation_id)?;
        writeln!(out, "    [{}] {}", hit.role, preview(&hit.content))?;
        writeln!(out, "    {}\n", hit.timestamp)?;
    }
    Ok(())
}

pub fn list_projects(store: &Store, out: &mut impl Write) -> Result<()> {
    let projects = store.project_counts()?;
    if projects.is_empty() {
        writeln!(out, "No projects found")?;
    } else {
        writeln!(out, "Projects ({}):\n", projects.len())?;
        for (project, count) in &projects {
            writeln!(out, "  {}: {} conversation(s)", project, count)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Full text framed for pasting into a chat window
pub fn export(store: &Store, id: &str, out: &mut impl Write) -> Result<()> {
    let text = match store.full_text(id)? {
        Some(text) => text,
        None => {
            writeln!(out, "Conversation {} not found", id)?;
            return Ok(());
        }
    };
    let rule = "=".repeat(50);
    writeln!(out, "\n{}", rule)?;
    writeln!(out, "HAIKU-INDEX: Exported Conversation")?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "{}", text)?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "\nFormatted for pasting into a chat window\n")?;
    Ok(())
}

/// Per-file counts and run totals
pub fn ingest_summary(report: &IngestReport, out: &mut impl Write) -> Result<()> {
    let rule = "=".repeat(RULE_WIDTH);

    for missing in &report.missing {
        writeln!(out, "  - {}: no JSONL files found", missing)?;
    }
    if report.files.is_empty() {
        writeln!(out, "No files found to ingest")?;
    }
    for file in &report.files {
        writeln!(out, "\n{}", file.label)?;
        writeln!(out, "  File: {}", file.path.display())?;
        writeln!(out, "  Size: {:.1}MB", file.size_mb())?;
        if let Some(err) = &file.error {
            writeln!(out, "  Error: {}", err)?;
            continue;
        }
        writeln!(out, "  Conversations: {}", file.conversations)?;
        writeln!(out, "  Messages: {} ({} new)", file.messages, file.messages_inserted)?;
        if file.failed_conversations > 0 {
            writeln!(out, "  Failed conversations: {}", file.failed_conversations)?;
        }
        if file.skipped_records > 0 {
            writeln!(out, "  Skipped records: {}", file.skipped_records)?;
        }
        writeln!(out, "  Time: {:.1}s", file.elapsed.as_secs_f64())?;
    }

    writeln!(out, "\n{}", rule)?;
    writeln!(out, "SUMMARY:")?;
    writeln!(out, "  Files: {}", report.files.len())?;
    writeln!(out, "  Total Conversations: {}", report.total_conversations())?;
    writeln!(out, "  Total Messages: {}", report.total_messages())?;
    if report.total_failures() > 0 {
        writeln!(out, "  Failures: {}", report.total_failures())?;
    }
    writeln!(out, "{}\n", rule)?;
    Ok(())
}

/// Totals re-queried from the store after a run
pub fn verification_summary(verification: &Verification, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Database verified:")?;
    writeln!(out, "  Total in DB: {} conversations", verification.conversations)?;
    if verification.full_texts != verification.conversations {
        writeln!(out, "  Full-text rows: {}", verification.full_texts)?;
    }
    if !verification.by_project.is_empty() {
        writeln!(out, "\nBy project:")?;
        for (project, count) in &verification.by_project {
            writeln!(out, "  {}: {} conversation(s)", project, count)?;
        }
    }
    writeln!(out, "\nMessages:")?;
    writeln!(out, "  Total: {} messages indexed\n", verification.messages)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FileReport;
    use crate::sessions::{Conversation, NormalizedMessage};
    use tempfile::TempDir;

    fn store_with(dir: &TempDir, id: &str, content: &str) -> Store {
        let mut store = Store::open(&dir.path().join("haiku.db")).unwrap();
        let mut conv = Conversation::new(id.to_string(), "2026-02-03T10:00:00Z".to_string());
        conv.messages.push(NormalizedMessage {
            conversation_id: id.to_string(),
            message_id: "1".to_string(),
            role: "user".to_string(),
            content: content.to_string(),
            timestamp: "2026-02-03T10:00:00Z".to_string(),
        });
        store.write_conversation(&conv, Some("Q19")).unwrap();
        store
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_misses_print_messages() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("haiku.db")).unwrap();
        assert!(render(|o| search(&store, "nothing", o)).contains("No results found for \"nothing\""));
        assert!(render(|o| view(&store, "abc", o)).contains("Conversation abc not found"));
        assert!(render(|o| export(&store, "abc", o)).contains("Conversation abc not found"));
        assert!(render(|o| search_messages(&store, "x", o)).contains("No messages found"));
        assert!(render(|o| list_projects(&store, o)).contains("No projects found"));
    }

    #[test]
    fn test_view_and_export() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, "c1", "avatar pipeline");
        let viewed = render(|o| view(&store, "c1", o));
        assert!(viewed.contains("Project: Q19"));
        assert!(viewed.contains("Topics: avatar"));
        assert!(viewed.contains("USER: avatar pipeline"));

        let exported = render(|o| export(&store, "c1", o));
        assert!(exported.contains("HAIKU-INDEX: Exported Conversation"));
        assert!(exported.contains("USER: avatar pipeline"));
    }

    #[test]
    fn test_search_messages_truncates_preview() {
        let dir = TempDir::new().unwrap();
        let long = format!("needle {}", "z".repeat(200));
        let store = store_with(&dir, "c1", &long);
        let out = render(|o| search_messages(&store, "needle", o));
        assert!(out.contains(&format!("[user] needle {}...", "z".repeat(93))));
    }

    #[test]
    fn test_ingest_summary_reports_partial_failures() {
        let report = IngestReport {
            files: vec![FileReport {
                label: "Q19".to_string(),
                conversations: 2,
                messages: 5,
                failed_conversations: 1,
                skipped_records: 3,
                ..FileReport::default()
            }],
            missing: vec!["Q11".to_string()],
        };
        let out = render(|o| ingest_summary(&report, o));
        assert!(out.contains("Q11: no JSONL files found"));
        assert!(out.contains("Total Conversations: 2"));
        assert!(out.contains("Failures: 1"));
        assert!(out.contains("Skipped records: 3"));
    }

    #[test]
    fn test_verification_summary() {
        let verification = Verification {
            conversations: 2,
            full_texts: 2,
            by_project: vec![("Q19".to_string(), 2)],
            messages: 5,
        };
        let out = render(|o| verification_summary(&verification, o));
        assert!(out.contains("Total in DB: 2 conversations"));
        assert!(!out.contains("Full-text rows"));
        assert!(out.contains("Q19: 2 conversation(s)"));
        assert!(out.contains("Total: 5 messages indexed"));
    }
}
