//! Event log for diagnosing stream behavior.
//!
//! Writes JSON lines to a file: every feed event received, dropped messages,
//! sends, cancellations and turn completions.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use quill_core::TurnState;

const PREVIEW_CHARS: usize = 100;

/// Event logger that writes JSON lines to a file.
pub struct DebugLogger {
    writer: Mutex<BufWriter<File>>,
}

impl DebugLogger {
    /// Create a new logger appending to the specified file.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn log<T: Serialize>(&self, event_type: &str, data: T) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            data: serde_json::to_value(data).unwrap_or_default(),
        };

        if let Ok(mut writer) = self.writer.lock() {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    /// Log a decoded feed event verbatim.
    pub fn log_event(&self, event: &serde_json::Value) {
        self.log("event", event);
    }

    /// Log a feed message that could not be decoded.
    pub fn log_dropped(&self, data: &str, error: &str) {
        self.log(
            "message_dropped",
            DroppedEvent {
                error: error.to_string(),
                data_preview: preview(data),
            },
        );
    }

    pub fn log_message_sent(&self, session_id: &str, text: &str) {
        self.log(
            "message_sent",
            MessageSentEvent {
                session_id: session_id.to_string(),
                content_length: text.len(),
                content_preview: preview(text),
            },
        );
    }

    pub fn log_send_failed(&self, error: &str) {
        self.log(
            "send_failed",
            SendFailedEvent {
                error: error.to_string(),
            },
        );
    }

    pub fn log_cancelled(&self, turn: &TurnState) {
        self.log("cancelled", TurnSummary::from(turn));
    }

    pub fn log_turn_complete(&self, turn: &TurnState) {
        self.log("turn_complete", TurnSummary::from(turn));
    }

    pub fn log_disconnected(&self, reason: &str) {
        self.log(
            "disconnected",
            DisconnectedEvent {
                reason: reason.to_string(),
            },
        );
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    event_type: String,
    data: serde_json::Value,
}

#[derive(Serialize)]
struct DroppedEvent {
    error: String,
    data_preview: String,
}

#[derive(Serialize)]
struct MessageSentEvent {
    session_id: String,
    content_length: usize,
    content_preview: String,
}

#[derive(Serialize)]
struct SendFailedEvent {
    error: String,
}

#[derive(Serialize)]
struct DisconnectedEvent {
    reason: String,
}

#[derive(Serialize)]
struct TurnSummary {
    part_count: usize,
    parts: Vec<PartSummary>,
    event_count: usize,
}

#[derive(Serialize)]
struct PartSummary {
    key: String,
    kind: String,
    text_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

impl From<&TurnState> for TurnSummary {
    fn from(turn: &TurnState) -> Self {
        Self {
            part_count: turn.parts.len(),
            parts: turn
                .parts
                .iter()
                .map(|p| PartSummary {
                    key: p.key.clone(),
                    kind: p.kind().to_string(),
                    text_length: p.text().len(),
                    duration_ms: p.duration_ms(),
                })
                .collect(),
            event_count: turn.events.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Part, PartBody};
    use std::io::Read;
    use tempfile::NamedTempFile;

    fn read(path: &Path) -> String {
        let mut content = String::new();
        File::open(path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    #[test]
    fn test_logger_writes_json_lines() {
        let temp = NamedTempFile::new().unwrap();
        let logger = DebugLogger::new(temp.path()).unwrap();
        logger.log_event(&serde_json::json!({"type": "status"}));
        logger.log_dropped("{oops", "expected value");
        drop(logger);

        let content = read(temp.path());
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event_type"], "event");
        assert_eq!(first["data"]["type"], "status");
        assert!(lines[1].contains("message_dropped"));
        assert!(lines[1].contains("{oops"));
    }

    #[test]
    fn test_turn_summary() {
        let mut turn = TurnState::new();
        turn.parts.push(Part::new(
            "r1",
            PartBody::Thinking {
                text: "hmm".into(),
                duration_ms: Some(1500),
            },
        ));
        turn.parts.push(Part::new(
            "a1",
            PartBody::Answer {
                text: "hello".into(),
            },
        ));
        let summary = TurnSummary::from(&turn);
        assert_eq!(summary.part_count, 2);
        assert_eq!(summary.parts[0].kind, "thinking");
        assert_eq!(summary.parts[0].duration_ms, Some(1500));
        assert_eq!(summary.parts[1].text_length, 5);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
