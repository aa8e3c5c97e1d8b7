//! Metadata derived from conversation text.
//!
//! Everything here is a pure function of its input: project codes, topic
//! keywords, completion status, the two-slot summary, the title, and the
//! chars/4 token estimate.

use crate::sessions::NormalizedMessage;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Project codes: `Q<digits>` plus a handful of named projects
const PROJECT_PATTERN: &str = r"(?i)Q\d+|ESLTP|AAA|BBB|CCCMPS|DOCTOR|IDEAVOICE";

const TOPIC_KEYWORDS: &[&str] = &[
    "avatar", "voice", "tts", "stt", "component", "circuit", "inventory", "api", "database",
    "nodejs", "nginx", "postgres", "cli", "ui", "frontend", "backend", "deployment", "failover",
    "sync",
];

/// Any of these marks a conversation as incomplete
const INCOMPLETE_KEYWORDS: &[&str] = &[
    "todo", "pending", "next", "upcoming", "future", "incomplete", "wip", "work in progress",
];

/// Strict subset of [`INCOMPLETE_KEYWORDS`]
const TODO_KEYWORDS: &[&str] = &["todo", "pending", "next", "upcoming", "future"];

const SUMMARY_SLOT_CHARS: usize = 50;
const TITLE_CHARS: usize = 60;

pub const MAX_KEY_TOPICS: usize = 5;

fn project_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PROJECT_PATTERN).expect("project pattern is valid"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keywords {
    /// Upper-cased, deduplicated, sorted
    pub projects: Vec<String>,
    /// Sorted vocabulary hits
    pub topics: Vec<String>,
}

impl Keywords {
    /// Comma-joined topics, at most [`MAX_KEY_TOPICS`]
    pub fn key_topics(&self) -> String {
        self.topics
            .iter()
            .take(MAX_KEY_TOPICS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Complete,
    Incomplete,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Complete => "complete",
            Status::Incomplete => "incomplete",
        }
    }
}

pub fn extract_keywords(text: &str) -> Keywords {
    let projects: BTreeSet<String> = project_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_uppercase())
        .collect();

    let lower = text.to_lowercase();
    let topics = TOPIC_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .map(|kw| kw.to_string())
        .collect::<BTreeSet<_>>();

    Keywords {
        projects: projects.into_iter().collect(),
        topics: topics.into_iter().collect(),
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|kw| lower.contains(kw))
}

pub fn detect_status(text: &str) -> Status {
    if contains_any(text, INCOMPLETE_KEYWORDS) {
        Status::Incomplete
    } else {
        Status::Complete
    }
}

pub fn detect_todos(text: &str) -> bool {
    contains_any(text, TODO_KEYWORDS)
}

/// First `max` characters, with `...` appended when anything was cut
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// `User: <first user message> | Assistant: <last assistant message>`
pub fn generate_summary(messages: &[NormalizedMessage]) -> String {
    if messages.is_empty() {
        return "No summary available".to_string();
    }

    let first_user = messages.iter().find(|m| m.role == "user");
    let last_assistant = messages.iter().rev().find(|m| m.role == "assistant");

    let mut summary = String::new();
    if let Some(user) = first_user {
        summary.push_str("User: ");
        summary.push_str(&truncate_chars(&user.content, SUMMARY_SLOT_CHARS));
    }
    summary.push_str(" | ");
    if let Some(assistant) = last_assistant {
        summary.push_str("Assistant: ");
        summary.push_str(&truncate_chars(&assistant.content, SUMMARY_SLOT_CHARS));
    }
    summary
}

/// Opening of the first message, or "Untitled"
pub fn derive_title(messages: &[NormalizedMessage]) -> String {
    let title: String = messages
        .first()
        .map(|m| m.content.chars().take(TITLE_CHARS).collect())
        .unwrap_or_default();
    if title.trim().is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

/// Rough token count: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Last path segment for path-like values ("/var/www/html/Q19" -> "Q19")
fn path_suffix(value: &str) -> Option<&str> {
    let trimmed = value.trim().trim_end_matches('/');
    let suffix = if trimmed.contains('/') {
        trimmed.rsplit('/').next().unwrap_or("")
    } else {
        trimmed
    };
    if suffix.is_empty() || suffix == "unknown" {
        None
    } else {
        Some(suffix)
    }
}

/// Pick a project name.
///
/// Precedence: explicit `project` field, then the discovery hint taken from
/// the source directory, then the session's working directory, then the first
/// project code found in the text.
pub fn infer_project(
    explicit: Option<&str>,
    discovery_hint: Option<&str>,
    cwd: Option<&str>,
    keywords: &Keywords,
) -> String {
    explicit
        .and_then(path_suffix)
        .or_else(|| discovery_hint.filter(|h| !h.is_empty()))
        .or_else(|| cwd.and_then(path_suffix))
        .map(str::to_string)
        .or_else(|| keywords.projects.first().cloned())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: &str, content: &str) -> NormalizedMessage {
        NormalizedMessage {
            conversation_id: "c".to_string(),
            message_id: "m".to_string(),
            role: role.to_string(),
            content: content.to_string(),
            timestamp: String::new(),
        }
    }

    #[test]
    fn test_extract_keywords() {
        let kw = extract_keywords("Working on Q19 avatar TTS integration");
        assert_eq!(kw.projects, vec!["Q19".to_string()]);
        assert!(kw.topics.contains(&"avatar".to_string()));
        assert!(kw.topics.contains(&"tts".to_string()));
    }

    #[test]
    fn test_extract_keywords_dedups_and_sorts_projects() {
        let kw = extract_keywords("q21 then Q10, back to Q21 and eslTP");
        assert_eq!(kw.projects, vec!["ESLTP", "Q10", "Q21"]);
    }

    #[test]
    fn test_key_topics_capped() {
        let kw = extract_keywords("avatar voice api database nginx postgres frontend");
        assert!(kw.topics.len() > MAX_KEY_TOPICS);
        assert_eq!(kw.key_topics().split(", ").count(), MAX_KEY_TOPICS);
    }

    #[test]
    fn test_detect_status() {
        assert_eq!(detect_status("all shipped"), Status::Complete);
        assert_eq!(detect_status("this is a WIP branch"), Status::Incomplete);
        assert_eq!(detect_status("still Work In Progress"), Status::Incomplete);
        assert_eq!(detect_status("todo: fix"), Status::Incomplete);
    }

    #[test]
    fn test_todos_imply_incomplete() {
        for text in ["TODO", "pending review", "next step", "Upcoming", "in the future", "done"] {
            if detect_todos(text) {
                assert_eq!(detect_status(text), Status::Incomplete, "{}", text);
            }
        }
        assert!(!detect_todos("wip"));
        assert!(detect_todos("Next up"));
    }

    #[test]
    fn test_generate_summary() {
        let messages = vec![message("user", "Hello world"), message("assistant", "Hi there")];
        assert_eq!(generate_summary(&messages), "User: Hello world | Assistant: Hi there");
    }

    #[test]
    fn test_generate_summary_truncates_and_picks_last_assistant() {
        let long = "x".repeat(60);
        let messages = vec![
            message("assistant", "first reply"),
            message("user", &long),
            message("assistant", "final reply"),
        ];
        let summary = generate_summary(&messages);
        assert_eq!(summary, format!("User: {}... | Assistant: final reply", "x".repeat(50)));
    }

    #[test]
    fn test_generate_summary_missing_roles() {
        assert_eq!(generate_summary(&[message("user", "only me")]), "User: only me | ");
        assert_eq!(generate_summary(&[message("assistant", "only me")]), " | Assistant: only me");
        assert_eq!(generate_summary(&[]), "No summary available");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_derive_title() {
        let long = "y".repeat(80);
        assert_eq!(derive_title(&[message("user", &long)]).chars().count(), 60);
        assert_eq!(derive_title(&[]), "Untitled");
    }

    #[test]
    fn test_infer_project_precedence() {
        let kw = extract_keywords("Q12 work");
        assert_eq!(infer_project(Some("/var/www/html/Q19"), Some("Q10"), None, &kw), "Q19");
        assert_eq!(infer_project(None, Some("Q10"), None, &kw), "Q10");
        assert_eq!(infer_project(Some("unknown"), None, None, &kw), "Q12");
        assert_eq!(infer_project(None, None, None, &Keywords::default()), "unknown");
    }

    #[test]
    fn test_infer_project_cwd_ranks_below_discovery_hint() {
        let kw = extract_keywords("Q12 work");
        let cwd = Some("/var/www/html/Q19/frontend");
        assert_eq!(infer_project(None, Some("Q19"), cwd, &kw), "Q19");
        assert_eq!(infer_project(None, None, cwd, &kw), "frontend");
        assert_eq!(infer_project(Some("Q21"), Some("Q19"), cwd, &kw), "Q21");
    }
}
