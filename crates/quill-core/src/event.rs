//! Wire schema for the agent server's event feed.
//!
//! Decoding happens in two steps: the envelope (`type` + `properties`) is read
//! first, then the properties are parsed according to the type string. Event
//! and part types this client does not know decode to [`StreamEvent::Unknown`]
//! or are ignored downstream, so newer servers stay compatible.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::part::PartKind;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Value,
}

/// Reported start/end times, in epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TimeSpan {
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ToolState {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A part as the server describes it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WirePart {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub state: Option<ToolState>,
    #[serde(default)]
    pub time: Option<TimeSpan>,
    #[serde(default, rename = "sessionID")]
    pub session_id: Option<String>,
}

impl WirePart {
    /// Part kind for this wire type, `None` for types that carry no display text.
    pub fn kind(&self) -> Option<PartKind> {
        match self.part_type.as_str() {
            "text" => Some(PartKind::Answer),
            "reasoning" => Some(PartKind::Thinking),
            "tool" => Some(PartKind::Tool),
            _ => None,
        }
    }

    pub fn is_step_start(&self) -> bool {
        self.part_type == "step-start"
    }

    pub fn tool_name(&self) -> &str {
        self.tool.as_deref().unwrap_or("tool")
    }

    /// Text to show for this part. Tool parts without text are described by
    /// their name plus the state title (or status).
    pub fn display_text(&self) -> String {
        if let Some(text) = &self.text {
            return text.clone();
        }
        if self.part_type != "tool" {
            return String::new();
        }
        let name = self.tool_name();
        match &self.state {
            Some(ToolState {
                title: Some(title), ..
            }) if !title.is_empty() => format!("{name} {title}"),
            Some(ToolState {
                status: Some(status),
                ..
            }) => format!("{name} ({status})"),
            _ => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileDiff {
    pub file: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

impl FileDiff {
    /// Post-change content used for de-duplication. Falls back to the
    /// addition/deletion counts when the server omits the content.
    pub fn snapshot(&self) -> String {
        match &self.after {
            Some(after) => after.clone(),
            None => format!("+{}/-{}", self.additions, self.deletions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Busy,
    Retry {
        message: Option<String>,
        /// Epoch milliseconds of the next attempt.
        next: Option<i64>,
        attempt: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    PartUpdated {
        session_id: Option<String>,
        part: WirePart,
        delta: Option<String>,
    },
    PartDelta {
        session_id: Option<String>,
        part_id: String,
        delta: String,
        time: Option<TimeSpan>,
    },
    Diff {
        session_id: Option<String>,
        files: Vec<FileDiff>,
    },
    Status {
        session_id: Option<String>,
        status: SessionStatus,
    },
    Unknown {
        kind: String,
    },
}

#[derive(Deserialize)]
struct PartUpdatedProps {
    part: WirePart,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default, rename = "sessionID")]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct PartDeltaProps {
    #[serde(rename = "partID")]
    part_id: String,
    delta: String,
    #[serde(default)]
    time: Option<TimeSpan>,
    #[serde(default, rename = "sessionID")]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct DiffProps {
    #[serde(default)]
    diff: Vec<FileDiff>,
    #[serde(default, rename = "sessionID")]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct StatusBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    next: Option<i64>,
    #[serde(default)]
    attempt: Option<u32>,
}

#[derive(Deserialize)]
struct StatusProps {
    status: StatusBody,
    #[serde(default, rename = "sessionID")]
    session_id: Option<String>,
}

impl StreamEvent {
    /// Decode one feed message. Only malformed JSON or a known event type
    /// with a broken payload is an error.
    pub fn decode(data: &str) -> Result<Self, Error> {
        let envelope: Envelope = serde_json::from_str(data)?;
        Self::from_parts(envelope.kind, envelope.properties)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let envelope: Envelope = serde_json::from_value(value)?;
        Self::from_parts(envelope.kind, envelope.properties)
    }

    fn from_parts(kind: String, properties: Value) -> Result<Self, Error> {
        let event = match kind.as_str() {
            "part.updated" | "message.part.updated" => {
                let props: PartUpdatedProps = serde_json::from_value(properties)?;
                let session_id = props.session_id.or_else(|| props.part.session_id.clone());
                StreamEvent::PartUpdated {
                    session_id,
                    part: props.part,
                    delta: props.delta,
                }
            }
            "part.delta" | "message.part.delta" => {
                let props: PartDeltaProps = serde_json::from_value(properties)?;
                StreamEvent::PartDelta {
                    session_id: props.session_id,
                    part_id: props.part_id,
                    delta: props.delta,
                    time: props.time,
                }
            }
            "diff" | "session.diff" => {
                let props: DiffProps = serde_json::from_value(properties)?;
                StreamEvent::Diff {
                    session_id: props.session_id,
                    files: props.diff,
                }
            }
            "status" | "session.status" => {
                let props: StatusProps = serde_json::from_value(properties)?;
                let status = match props.status.kind.as_str() {
                    "idle" => SessionStatus::Idle,
                    "busy" => SessionStatus::Busy,
                    "retry" => SessionStatus::Retry {
                        message: props.status.message,
                        next: props.status.next,
                        attempt: props.status.attempt,
                    },
                    other => {
                        return Ok(StreamEvent::Unknown {
                            kind: format!("{kind}:{other}"),
                        })
                    }
                };
                StreamEvent::Status {
                    session_id: props.session_id,
                    status,
                }
            }
            _ => StreamEvent::Unknown { kind },
        };
        Ok(event)
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            StreamEvent::PartUpdated { session_id, .. }
            | StreamEvent::PartDelta { session_id, .. }
            | StreamEvent::Diff { session_id, .. }
            | StreamEvent::Status { session_id, .. } => session_id.as_deref(),
            StreamEvent::Unknown { .. } => None,
        }
    }

    /// Events that belong to `session` or carry no session tag at all.
    pub fn is_for_session(&self, session: &str) -> bool {
        self.session_id().map_or(true, |id| id == session)
    }

    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            StreamEvent::Status {
                status: SessionStatus::Idle,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_part_updated() {
        let data = r#"{"type":"message.part.updated","properties":{"part":{"id":"p1","type":"text","text":"Hello","sessionID":"s1"}}}"#;
        let event = StreamEvent::decode(data).unwrap();
        match &event {
            StreamEvent::PartUpdated { part, delta, .. } => {
                assert_eq!(part.id, "p1");
                assert_eq!(part.kind(), Some(PartKind::Answer));
                assert_eq!(part.text.as_deref(), Some("Hello"));
                assert!(delta.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(event.session_id(), Some("s1"));
        assert!(event.is_for_session("s1"));
        assert!(!event.is_for_session("s2"));
    }

    #[test]
    fn test_decode_part_delta() {
        let data = r#"{"type":"part.delta","properties":{"partID":"p2","delta":"wor","time":{"start":1000}}}"#;
        let event = StreamEvent::decode(data).unwrap();
        assert_eq!(
            event,
            StreamEvent::PartDelta {
                session_id: None,
                part_id: "p2".into(),
                delta: "wor".into(),
                time: Some(TimeSpan {
                    start: Some(1000),
                    end: None
                }),
            }
        );
        assert!(event.is_for_session("anything"));
    }

    #[test]
    fn test_decode_status_variants() {
        let idle = StreamEvent::decode(r#"{"type":"status","properties":{"status":{"type":"idle"}}}"#)
            .unwrap();
        assert!(idle.is_idle());

        let retry = StreamEvent::decode(
            r#"{"type":"session.status","properties":{"sessionID":"s","status":{"type":"retry","message":"overloaded","next":1700000005000,"attempt":2}}}"#,
        )
        .unwrap();
        assert_eq!(
            retry,
            StreamEvent::Status {
                session_id: Some("s".into()),
                status: SessionStatus::Retry {
                    message: Some("overloaded".into()),
                    next: Some(1_700_000_005_000),
                    attempt: Some(2),
                },
            }
        );

        let odd = StreamEvent::decode(r#"{"type":"status","properties":{"status":{"type":"paused"}}}"#)
            .unwrap();
        assert!(matches!(odd, StreamEvent::Unknown { .. }));
    }

    #[test]
    fn test_decode_diff() {
        let data = r#"{"type":"diff","properties":{"diff":[{"file":"src/a.rs","after":"fn a() {}","additions":1,"deletions":0},{"file":"b.txt","additions":3,"deletions":2}]}}"#;
        let StreamEvent::Diff { files, .. } = StreamEvent::decode(data).unwrap() else {
            panic!("expected diff");
        };
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].snapshot(), "fn a() {}");
        assert_eq!(files[1].snapshot(), "+3/-2");
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let event = StreamEvent::decode(r#"{"type":"lsp.updated","properties":{}}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Unknown {
                kind: "lsp.updated".into()
            }
        );
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(StreamEvent::decode("{not json").is_err());
        assert!(StreamEvent::decode(r#"{"type":"part.delta","properties":{}}"#).is_err());
    }

    #[test]
    fn test_tool_display_text() {
        let part: WirePart = serde_json::from_value(serde_json::json!({
            "id": "t1", "type": "tool", "tool": "bash",
            "state": {"status": "running", "title": "cargo fmt"}
        }))
        .unwrap();
        assert_eq!(part.display_text(), "bash cargo fmt");

        let pending: WirePart = serde_json::from_value(serde_json::json!({
            "id": "t2", "type": "tool", "tool": "read", "state": {"status": "pending"}
        }))
        .unwrap();
        assert_eq!(pending.display_text(), "read (pending)");
    }

    #[test]
    fn test_unknown_part_type_has_no_kind() {
        let part: WirePart =
            serde_json::from_value(serde_json::json!({"id": "x", "type": "snapshot"})).unwrap();
        assert_eq!(part.kind(), None);
        assert!(!part.is_step_start());
    }
}
