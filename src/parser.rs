//! JSONL record parser.
//!
//! Reads one JSON object per line and resolves each into a [`RawRecord`].
//! Lines that are not valid UTF-8, not valid JSON, or not shaped like a record
//! are dropped without noise. Two wire shapes are understood:
//!
//! - `Session`: Claude Code session logs, content nested at `message.content`
//! - `History`: flat `history.jsonl` entries carrying `display` or `content`

use crate::sessions::{ContentBlock, MessageRecord, Payload, RawRecord};
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;
use tracing::warn;

const SNAPSHOT_TYPE: &str = "file-history-snapshot";

/// Which record shape a source file uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMapping {
    Session,
    History,
}

/// JSONL record envelope (unknown fields ignored)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    session_id: Option<Value>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    uuid: Option<Value>,
    message_id: Option<Value>,
    #[serde(rename = "message_id")]
    message_id_snake: Option<Value>,
    timestamp: Option<Value>,
    message: Option<WireMessage>,
    content: Option<Value>,
    display: Option<String>,
    role: Option<String>,
    project: Option<String>,
    cwd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: Option<Value>,
    role: Option<String>,
    content: Option<Value>,
}

/// String ids pass through, numeric ids are stringified, anything else is absent
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// ISO-8601 strings pass through; numbers are epoch milliseconds
pub fn normalize_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            let ms = n.as_f64()?;
            let secs = (ms / 1000.0).floor() as i64;
            let nanos = ((ms - secs as f64 * 1000.0) * 1_000_000.0) as u32;
            chrono::DateTime::from_timestamp(secs, nanos)
                .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        }
        _ => None,
    }
}

/// Plain strings stay whole; arrays become typed blocks, one at a time, so a
/// single odd block cannot sink the rest of the message
fn payload_from(value: Option<&Value>) -> Payload {
    match value {
        Some(Value::String(s)) => Payload::Plain(s.clone()),
        Some(Value::Array(items)) => Payload::Blocks(
            items
                .iter()
                .map(|item| {
                    serde_json::from_value::<ContentBlock>(item.clone()).unwrap_or(ContentBlock::Other)
                })
                .collect(),
        ),
        _ => Payload::Empty,
    }
}

impl WireRecord {
    fn resolve(self, line: usize, mapping: FieldMapping) -> RawRecord {
        if self.record_type.as_deref() == Some(SNAPSHOT_TYPE) {
            return RawRecord::Snapshot;
        }
        let session_id = match self.session_id.as_ref().and_then(id_string) {
            Some(id) => id,
            None => return RawRecord::Orphan,
        };

        let timestamp = self.timestamp.as_ref().and_then(normalize_timestamp);
        let project = self.project.clone();
        let cwd = self.cwd.clone();

        let (message_id, role, payload) = match mapping {
            FieldMapping::Session => self.session_fields(),
            FieldMapping::History => self.history_fields(),
        };

        RawRecord::Message(MessageRecord {
            line,
            session_id,
            message_id,
            role,
            timestamp,
            project,
            cwd,
            payload,
        })
    }

    fn session_fields(self) -> (Option<String>, String, Payload) {
        let outer_type = self.record_type.unwrap_or_else(|| "unknown".to_string());
        match self.message {
            Some(message) => {
                let id = message
                    .id
                    .as_ref()
                    .and_then(id_string)
                    .or_else(|| self.uuid.as_ref().and_then(id_string));
                let role = message.role.unwrap_or(outer_type);
                (id, role, payload_from(message.content.as_ref()))
            }
            None => {
                let id = self.uuid.as_ref().and_then(id_string);
                let role = self.role.unwrap_or(outer_type);
                (id, role, payload_from(self.content.as_ref()))
            }
        }
    }

    fn history_fields(self) -> (Option<String>, String, Payload) {
        let id = self
            .message_id
            .as_ref()
            .and_then(id_string)
            .or_else(|| self.message_id_snake.as_ref().and_then(id_string))
            .or_else(|| self.uuid.as_ref().and_then(id_string));

        let role = self
            .role
            .or_else(|| {
                self.display
                    .as_ref()
                    .filter(|d| !d.is_empty())
                    .map(|_| "user".to_string())
            })
            .or_else(|| self.message.as_ref().and_then(|m| m.role.clone()))
            .or(self.record_type)
            .unwrap_or_else(|| "unknown".to_string());

        let payload = match self.display {
            Some(display) if !display.is_empty() => Payload::Plain(display),
            _ => match self.content.as_ref() {
                Some(content) => payload_from(Some(content)),
                None => payload_from(self.message.as_ref().and_then(|m| m.content.as_ref())),
            },
        };
        (id, role, payload)
    }
}

/// Lazy iterator over the records of a line-oriented source.
///
/// Finite and not restartable: a fresh parse needs a fresh reader.
pub struct RecordReader<R> {
    reader: R,
    mapping: FieldMapping,
    line: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R, mapping: FieldMapping) -> Self {
        Self {
            reader,
            mapping,
            line: 0,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("Stopped reading after line {}: {}", self.line, e);
                    return None;
                }
            }
            let line = self.line;
            self.line += 1;

            let text = match std::str::from_utf8(&self.buf) {
                Ok(t) => t.trim(),
                Err(_) => continue,
            };
            // Records are objects; serde would otherwise accept arrays as structs
            if !text.starts_with('{') {
                continue;
            }

            let record: WireRecord = match serde_json::from_str(text) {
                Ok(r) => r,
                Err(_) => continue,
            };
            return Some(record.resolve(line, self.mapping));
        }
    }
}

/// Convenience over [`RecordReader::new`]
pub fn records<R: BufRead>(reader: R, mapping: FieldMapping) -> RecordReader<R> {
    RecordReader::new(reader, mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(input: &str, mapping: FieldMapping) -> Vec<RawRecord> {
        records(Cursor::new(input.as_bytes().to_vec()), mapping).collect()
    }

    #[test]
    fn test_skips_malformed_lines() {
        let input = "not json\n{\"sessionId\":\"s1\",\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":\"hi\"}}\n[1,2]\n\n{broken\n";
        let out = parse(input, FieldMapping::Session);
        assert_eq!(out.len(), 1);
        match &out[0] {
            RawRecord::Message(m) => {
                assert_eq!(m.line, 1);
                assert_eq!(m.session_id, "s1");
                assert_eq!(m.payload, Payload::Plain("hi".to_string()));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_line_is_dropped() {
        let mut bytes = b"\xff\xfe\n".to_vec();
        bytes.extend_from_slice(b"{\"sessionId\":\"s1\",\"type\":\"user\",\"content\":\"ok\"}\n");
        let out: Vec<_> = records(Cursor::new(bytes), FieldMapping::Session).filter_map(RawRecord::into_message).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line, 1);
    }

    #[test]
    fn test_snapshot_and_orphan() {
        let input = "{\"type\":\"file-history-snapshot\",\"sessionId\":\"s1\",\"message\":{\"role\":\"user\",\"content\":\"x\"}}\n{\"type\":\"user\",\"message\":{\"content\":\"no session\"}}\n";
        let out = parse(input, FieldMapping::Session);
        assert!(matches!(out[0], RawRecord::Snapshot));
        assert!(matches!(out[1], RawRecord::Orphan));
    }

    #[test]
    fn test_session_mapping_id_and_role_fallbacks() {
        let input = concat!(
            "{\"sessionId\":\"s1\",\"type\":\"assistant\",\"uuid\":\"u1\",\"message\":{\"id\":\"msg_1\",\"content\":[{\"type\":\"text\",\"text\":\"a\"}]}}\n",
            "{\"sessionId\":\"s1\",\"type\":\"user\",\"uuid\":\"u2\",\"timestamp\":\"2026-02-03T10:00:00Z\",\"message\":{\"role\":\"user\",\"content\":\"b\"}}\n",
        );
        let out: Vec<_> = records(Cursor::new(input.as_bytes().to_vec()), FieldMapping::Session)
            .filter_map(RawRecord::into_message)
            .collect();
        assert_eq!(out[0].message_id.as_deref(), Some("msg_1"));
        assert_eq!(out[0].role, "assistant");
        assert_eq!(out[0].timestamp, None);
        assert_eq!(out[1].message_id.as_deref(), Some("u2"));
        assert_eq!(out[1].timestamp.as_deref(), Some("2026-02-03T10:00:00Z"));
    }

    #[test]
    fn test_history_mapping() {
        let input = "{\"display\":\"deploy Q19\",\"timestamp\":1738886400000,\"project\":\"/var/www/html/Q19\",\"sessionId\":\"h1\"}\n";
        let out: Vec<_> = records(Cursor::new(input.as_bytes().to_vec()), FieldMapping::History)
            .filter_map(RawRecord::into_message)
            .collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, "user");
        assert_eq!(out[0].payload, Payload::Plain("deploy Q19".to_string()));
        assert_eq!(out[0].project.as_deref(), Some("/var/www/html/Q19"));
        assert!(out[0].timestamp.as_deref().unwrap().starts_with("2025-02-07"));
    }

    #[test]
    fn test_history_empty_display_is_not_a_user_turn() {
        let input = concat!(
            "{\"display\":\"\",\"sessionId\":\"h1\",\"content\":\"pasted\"}\n",
            "{\"display\":\"\",\"sessionId\":\"h1\",\"role\":\"assistant\",\"content\":\"reply\"}\n",
        );
        let out: Vec<_> = records(Cursor::new(input.as_bytes().to_vec()), FieldMapping::History)
            .filter_map(RawRecord::into_message)
            .collect();
        assert_eq!(out[0].role, "unknown");
        assert_eq!(out[0].payload, Payload::Plain("pasted".to_string()));
        assert_eq!(out[1].role, "assistant");
    }

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(
            normalize_timestamp(&serde_json::json!("2026-02-07T10:30:00Z")).as_deref(),
            Some("2026-02-07T10:30:00Z")
        );
        assert_eq!(
            normalize_timestamp(&serde_json::json!(1738886400000u64)).as_deref(),
            Some("2025-02-07T00:00:00.000Z")
        );
        assert_eq!(normalize_timestamp(&serde_json::json!(null)), None);
    }
}
