//! Groups message records from one source file into conversations.

use crate::sessions::{Conversation, MessageRecord, NormalizedMessage};
use std::collections::HashMap;

/// In-memory grouping for a single file; discarded once the file is flushed
pub struct Assembler {
    conversations: HashMap<String, Conversation>,
    /// Fallback timestamp for records that carry none
    ingest_time: String,
    empty_dropped: usize,
}

/// Result of assembling one file
#[derive(Debug, Default)]
pub struct Assembly {
    pub conversations: HashMap<String, Conversation>,
    /// Records whose flattened content was empty
    pub empty_dropped: usize,
}

impl Assembly {
    pub fn message_count(&self) -> usize {
        self.conversations.values().map(|c| c.messages.len()).sum()
    }
}

impl Assembler {
    pub fn new(ingest_time: impl Into<String>) -> Self {
        Self {
            conversations: HashMap::new(),
            ingest_time: ingest_time.into(),
            empty_dropped: 0,
        }
    }

    pub fn push(&mut self, record: MessageRecord) {
        let timestamp = record
            .timestamp
            .unwrap_or_else(|| self.ingest_time.clone());

        let conversation = self
            .conversations
            .entry(record.session_id.clone())
            .or_insert_with(|| Conversation::new(record.session_id.clone(), timestamp.clone()));

        if conversation.project_hint.is_none() {
            conversation.project_hint = record.project;
        }
        if conversation.cwd_hint.is_none() {
            conversation.cwd_hint = record.cwd;
        }

        let content = record.payload.flatten();
        if content.is_empty() {
            self.empty_dropped += 1;
            return;
        }

        // Line numbers are file-scoped, so the fallback stays unique across
        // conversations that share this file
        let message_id = record.message_id.unwrap_or_else(|| record.line.to_string());

        conversation.messages.push(NormalizedMessage {
            conversation_id: record.session_id,
            message_id,
            role: record.role,
            content,
            timestamp,
        });
    }

    /// Conversations with no retained messages are dropped here
    pub fn finish(self) -> Assembly {
        let conversations = self
            .conversations
            .into_iter()
            .filter(|(_, c)| !c.messages.is_empty())
            .collect();
        Assembly {
            conversations,
            empty_dropped: self.empty_dropped,
        }
    }
}

/// Assemble a whole record stream
pub fn assemble(records: impl IntoIterator<Item = MessageRecord>, ingest_time: &str) -> Assembly {
    let mut assembler = Assembler::new(ingest_time);
    for record in records {
        assembler.push(record);
    }
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{records, FieldMapping};
    use crate::sessions::RawRecord;
    use std::io::Cursor;

    const NOW: &str = "2026-03-01T00:00:00.000Z";

    fn assemble_str(input: &str) -> Assembly {
        let reader = records(Cursor::new(input.as_bytes().to_vec()), FieldMapping::Session);
        assemble(reader.filter_map(RawRecord::into_message), NOW)
    }

    #[test]
    fn test_groups_by_session_in_order() {
        let input = concat!(
            "{\"sessionId\":\"a\",\"type\":\"user\",\"uuid\":\"1\",\"timestamp\":\"2026-02-02T09:00:00Z\",\"message\":{\"role\":\"user\",\"content\":\"first\"}}\n",
            "{\"sessionId\":\"b\",\"type\":\"user\",\"uuid\":\"2\",\"message\":{\"role\":\"user\",\"content\":\"other\"}}\n",
            "{\"sessionId\":\"a\",\"type\":\"assistant\",\"uuid\":\"3\",\"message\":{\"role\":\"assistant\",\"content\":[{\"type\":\"text\",\"text\":\"second\"}]}}\n",
        );
        let assembly = assemble_str(input);
        assert_eq!(assembly.conversations.len(), 2);

        let a = &assembly.conversations["a"];
        assert_eq!(a.date, "2026-02-02T09:00:00Z");
        let contents: Vec<_> = a.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(a.messages[1].timestamp, NOW);

        let b = &assembly.conversations["b"];
        assert_eq!(b.date, NOW);
    }

    #[test]
    fn test_empty_content_dropped_and_empty_conversation_removed() {
        let input = concat!(
            "{\"sessionId\":\"a\",\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":\"\"}}\n",
            "{\"sessionId\":\"a\",\"type\":\"assistant\",\"message\":{\"role\":\"assistant\",\"content\":[{\"type\":\"tool_use\",\"id\":\"t\",\"name\":\"Bash\",\"input\":{}}]}}\n",
            "{\"sessionId\":\"b\",\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":\"kept\"}}\n",
        );
        let assembly = assemble_str(input);
        assert_eq!(assembly.empty_dropped, 2);
        assert!(!assembly.conversations.contains_key("a"));
        assert_eq!(assembly.message_count(), 1);
    }

    #[test]
    fn test_line_counter_fallback_is_file_scoped() {
        let input = concat!(
            "{\"sessionId\":\"a\",\"type\":\"user\",\"content\":\"one\"}\n",
            "{\"sessionId\":\"b\",\"type\":\"user\",\"content\":\"two\"}\n",
            "{\"sessionId\":\"a\",\"type\":\"user\",\"content\":\"three\"}\n",
        );
        let assembly = assemble_str(input);
        let a_ids: Vec<_> = assembly.conversations["a"].messages.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(a_ids, vec!["0", "2"]);
        assert_eq!(assembly.conversations["b"].messages[0].message_id, "1");
    }

    #[test]
    fn test_hints_taken_from_first_record_with_one() {
        let input = concat!(
            "{\"sessionId\":\"a\",\"type\":\"user\",\"content\":\"one\"}\n",
            "{\"sessionId\":\"a\",\"type\":\"user\",\"cwd\":\"/var/www/html/Q14\",\"content\":\"two\"}\n",
            "{\"sessionId\":\"a\",\"type\":\"user\",\"project\":\"Q18\",\"cwd\":\"/var/www/html/Q18\",\"content\":\"three\"}\n",
        );
        let assembly = assemble_str(input);
        let conv = &assembly.conversations["a"];
        assert_eq!(conv.cwd_hint.as_deref(), Some("/var/www/html/Q14"));
        assert_eq!(conv.project_hint.as_deref(), Some("Q18"));
    }

    #[test]
    fn test_snapshot_records_never_become_messages() {
        let input = "{\"type\":\"file-history-snapshot\",\"sessionId\":\"a\",\"content\":\"snapshot text\"}\n";
        let assembly = assemble_str(input);
        assert!(assembly.conversations.is_empty());
    }
}
