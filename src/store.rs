//! SQLite store: schema, per-conversation upsert, and the read queries behind
//! the command surface.
//!
//! Tables:
//! - `conversations_metadata`: one row per conversation, replaced on re-ingest
//! - `conversations_full`: full text + token estimate, replaced on re-ingest
//! - `messages`: one row per (conversation_id, message_id), first write wins

use crate::error::{IndexError, Result};
use crate::keywords::{self, Status};
use crate::sessions::Conversation;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS conversations_metadata (
        conversation_id TEXT PRIMARY KEY,
        project TEXT,
        date TEXT,
        title TEXT,
        message_count INTEGER NOT NULL DEFAULT 0,
        key_topics TEXT,
        summary TEXT,
        status TEXT NOT NULL,
        has_todos INTEGER NOT NULL DEFAULT 0,
        last_updated TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_metadata_project ON conversations_metadata(project);

    CREATE TABLE IF NOT EXISTS conversations_full (
        conversation_id TEXT PRIMARY KEY,
        full_text TEXT NOT NULL,
        token_estimate INTEGER NOT NULL DEFAULT 0,
        created_at TEXT
    );

    CREATE TABLE IF NOT EXISTS messages (
        conversation_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp TEXT,
        PRIMARY KEY (conversation_id, message_id)
    );
";

const SEARCH_LIMIT: i64 = 20;
const MESSAGE_SEARCH_LIMIT: i64 = 50;

/// Row for `conversations_metadata`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRow {
    pub conversation_id: String,
    pub project: String,
    pub date: String,
    pub title: String,
    pub message_count: i64,
    pub key_topics: String,
    pub summary: String,
    pub status: String,
    pub has_todos: bool,
    pub last_updated: String,
}

/// Row for `conversations_full`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullRow {
    pub conversation_id: String,
    pub full_text: String,
    pub token_estimate: i64,
    pub created_at: String,
}

/// Both conversation-level rows, recomputed from every message on each ingest
#[derive(Debug, Clone)]
pub struct ConversationRows {
    pub metadata: MetadataRow,
    pub full: FullRow,
}

impl ConversationRows {
    pub fn derive(conversation: &Conversation, discovery_hint: Option<&str>, now: &str) -> Self {
        let full_text = conversation.full_text();
        let keywords = keywords::extract_keywords(&conversation.joined_content());
        let project = keywords::infer_project(
            conversation.project_hint.as_deref(),
            discovery_hint,
            conversation.cwd_hint.as_deref(),
            &keywords,
        );
        let status: Status = keywords::detect_status(&full_text);

        Self {
            metadata: MetadataRow {
                conversation_id: conversation.id.clone(),
                project,
                date: conversation.day().to_string(),
                title: keywords::derive_title(&conversation.messages),
                message_count: conversation.messages.len() as i64,
                key_topics: keywords.key_topics(),
                summary: keywords::generate_summary(&conversation.messages),
                status: status.as_str().to_string(),
                has_todos: keywords::detect_todos(&full_text),
                last_updated: now.to_string(),
            },
            full: FullRow {
                conversation_id: conversation.id.clone(),
                token_estimate: keywords::estimate_tokens(&full_text) as i64,
                full_text,
                created_at: conversation.date.clone(),
            },
        }
    }
}

/// What one conversation write did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub messages_inserted: usize,
    pub messages_ignored: usize,
}

/// Compact search hit from `conversations_metadata`
#[derive(Debug, Clone)]
pub struct MetadataHit {
    pub conversation_id: String,
    pub project: String,
    pub date: String,
    pub title: String,
    pub message_count: i64,
    pub summary: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct MessageHit {
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

/// Aggregate counts re-queried after an ingest run
#[derive(Debug, Clone, Default)]
pub struct Verification {
    pub conversations: i64,
    /// Rows in `conversations_full`; matches `conversations` unless a write was lost
    pub full_texts: i64,
    /// (project, conversations), ordered by project name
    pub by_project: Vec<(String, i64)>,
    pub messages: i64,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database and make sure the schema exists
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened store at {}", db_path.display());
        Ok(Self { conn })
    }

    /// Remove every indexed row
    pub fn clear(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            DELETE FROM messages;
            DELETE FROM conversations_full;
            DELETE FROM conversations_metadata;
            ",
        )?;
        Ok(())
    }

    /// Upsert one conversation: replace both conversation-level rows, insert
    /// messages that are not already present. The three writes share one
    /// transaction; nothing spans conversations.
    pub fn write_conversation(
        &mut self,
        conversation: &Conversation,
        discovery_hint: Option<&str>,
    ) -> Result<WriteOutcome> {
        if conversation.messages.is_empty() {
            return Err(IndexError::EmptyConversation {
                id: conversation.id.clone(),
            });
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let rows = ConversationRows::derive(conversation, discovery_hint, &now);
        let meta = &rows.metadata;
        let full = &rows.full;

        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT OR REPLACE INTO conversations_metadata (
                conversation_id, project, date, title, message_count, key_topics,
                summary, status, has_todos, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                meta.conversation_id,
                meta.project,
                meta.date,
                meta.title,
                meta.message_count,
                meta.key_topics,
                meta.summary,
                meta.status,
                meta.has_todos,
                meta.last_updated,
            ],
        )?;
        tx.execute(
            "
            INSERT OR REPLACE INTO conversations_full (
                conversation_id, full_text, token_estimate, created_at
            ) VALUES (?1, ?2, ?3, ?4)
            ",
            params![full.conversation_id, full.full_text, full.token_estimate, full.created_at],
        )?;

        let mut outcome = WriteOutcome::default();
        {
            let mut stmt = tx.prepare_cached(
                "
                INSERT OR IGNORE INTO messages (
                    conversation_id, message_id, role, content, timestamp
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )?;
            for msg in &conversation.messages {
                let changed = stmt.execute(params![
                    conversation.id,
                    msg.message_id,
                    msg.role,
                    msg.content,
                    msg.timestamp,
                ])?;
                if changed > 0 {
                    outcome.messages_inserted += 1;
                } else {
                    outcome.messages_ignored += 1;
                }
            }
        }
        tx.commit()?;

        Ok(outcome)
    }

    /// Substring search over project, topics, summary and title
    pub fn search_metadata(&self, query: &str) -> Result<Vec<MetadataHit>> {
        let pattern = like_pattern(query);
        let mut stmt = self.conn.prepare(
            "
            SELECT conversation_id, project, date, title, message_count, summary, status
            FROM conversations_metadata
            WHERE project LIKE ?1 OR key_topics LIKE ?1 OR summary LIKE ?1 OR title LIKE ?1
            LIMIT ?2
            ",
        )?;
        let rows = stmt.query_map(params![pattern, SEARCH_LIMIT], |row| {
            Ok(MetadataHit {
                conversation_id: row.get(0)?,
                project: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                date: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                message_count: row.get(4)?,
                summary: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                status: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn metadata(&self, conversation_id: &str) -> Result<Option<MetadataRow>> {
        let row = self
            .conn
            .query_row(
                "
                SELECT conversation_id, project, date, title, message_count, key_topics,
                       summary, status, has_todos, last_updated
                FROM conversations_metadata
                WHERE conversation_id = ?1
                ",
                params![conversation_id],
                |row| {
                    Ok(MetadataRow {
                        conversation_id: row.get(0)?,
                        project: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        date: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        message_count: row.get(4)?,
                        key_topics: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                        summary: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                        status: row.get(7)?,
                        has_todos: row.get(8)?,
                        last_updated: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn full_text(&self, conversation_id: &str) -> Result<Option<String>> {
        let text = self
            .conn
            .query_row(
                "SELECT full_text FROM conversations_full WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text)
    }

    /// Substring search over individual message content
    pub fn search_messages(&self, query: &str) -> Result<Vec<MessageHit>> {
        let pattern = like_pattern(query);
        let mut stmt = self.conn.prepare(
            "
            SELECT conversation_id, role, content, timestamp
            FROM messages
            WHERE content LIKE ?1
            LIMIT ?2
            ",
        )?;
        let rows = stmt.query_map(params![pattern, MESSAGE_SEARCH_LIMIT], |row| {
            Ok(MessageHit {
                conversation_id: row.get(0)?,
                role: row.get(1)?,
                content: row.get(2)?,
                timestamp: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// (project, conversations), most conversations first
    pub fn project_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "
            SELECT project, COUNT(*) AS count
            FROM conversations_metadata
            WHERE project IS NOT NULL AND project != ''
            GROUP BY project
            ORDER BY count DESC, project ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn conversation_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM conversations_metadata", [], |row| row.get(0))?)
    }

    pub fn full_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM conversations_full", [], |row| row.get(0))?)
    }

    pub fn message_count(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
    }

    pub fn verification(&self) -> Result<Verification> {
        let mut by_project = self.project_counts()?;
        by_project.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Verification {
            conversations: self.conversation_count()?,
            full_texts: self.full_count()?,
            by_project,
            messages: self.message_count()?,
        })
    }
}

/// `%query%`; LIKE wildcards in the query are left as typed
fn like_pattern(query: &str) -> String {
    format!("%{}%", query)
}
