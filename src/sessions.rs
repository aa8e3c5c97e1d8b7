//! Shared conversation types.
//!
//! Every stage of the pipeline speaks in these types: the parser resolves raw
//! JSONL lines into [`RawRecord`], the assembler turns message records into
//! [`Conversation`]s, and the store derives its rows from them.

use serde::Deserialize;

/// Content block inside a structured message payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    /// tool_use, tool_result, image and anything newer
    #[serde(other)]
    Other,
}

/// Message content as found on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Plain(String),
    Blocks(Vec<ContentBlock>),
    Empty,
}

impl Payload {
    /// Flatten to plain text.
    ///
    /// Text blocks contribute their text, thinking blocks are prefixed with
    /// `[THINKING] `, everything else is dropped. Survivors are joined with a
    /// newline.
    pub fn flatten(&self) -> String {
        match self {
            Payload::Plain(text) => text.clone(),
            Payload::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } if !text.is_empty() => Some(text.clone()),
                    ContentBlock::Thinking { thinking } if !thinking.is_empty() => {
                        Some(format!("[THINKING] {}", thinking))
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Payload::Empty => String::new(),
        }
    }
}

/// A message-bearing record, already mapped out of its wire shape
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Zero-based physical line number within the source file
    pub line: usize,
    pub session_id: String,
    pub message_id: Option<String>,
    pub role: String,
    /// Normalized ISO-8601 timestamp, if the record carried one
    pub timestamp: Option<String>,
    /// Explicit `project` field, verbatim
    pub project: Option<String>,
    /// Working directory the session ran in
    pub cwd: Option<String>,
    pub payload: Payload,
}

/// One parsed line of input
#[derive(Debug, Clone)]
pub enum RawRecord {
    Message(MessageRecord),
    /// `file-history-snapshot` bookkeeping, never a message
    Snapshot,
    /// Valid JSON without a session key
    Orphan,
}

impl RawRecord {
    pub fn into_message(self) -> Option<MessageRecord> {
        match self {
            RawRecord::Message(record) => Some(record),
            RawRecord::Snapshot | RawRecord::Orphan => None,
        }
    }
}

/// A message ready for storage. Content is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub conversation_id: String,
    pub message_id: String,
    pub role: String, // "user", "assistant", or passthrough
    pub content: String,
    pub timestamp: String,
}

/// All messages sharing one session key, in input order
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<NormalizedMessage>,
    /// Timestamp of the first record seen for this session
    pub date: String,
    /// First explicit project field seen for this session
    pub project_hint: Option<String>,
    /// First working directory seen for this session
    pub cwd_hint: Option<String>,
}

impl Conversation {
    pub fn new(id: String, date: String) -> Self {
        Self {
            id,
            messages: Vec::new(),
            date,
            project_hint: None,
            cwd_hint: None,
        }
    }

    /// Calendar day (`YYYY-MM-DD`) of the conversation date
    pub fn day(&self) -> &str {
        self.date.split('T').next().unwrap_or(&self.date)
    }

    /// `ROLE: content` blocks separated by blank lines
    pub fn full_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Every message's content joined with spaces, for keyword scans
    pub fn joined_content(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
