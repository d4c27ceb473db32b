use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Thinking,
    Answer,
    Tool,
    FileChangeSummary,
}

impl std::fmt::Display for PartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartKind::Thinking => write!(f, "thinking"),
            PartKind::Answer => write!(f, "answer"),
            PartKind::Tool => write!(f, "tool"),
            PartKind::FileChangeSummary => write!(f, "file-change-summary"),
        }
    }
}

/// Kind-specific payload of a [`Part`]. The variant only changes while the
/// part is provisional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    Thinking {
        text: String,
        /// Set once, when an answer supersedes this trace.
        duration_ms: Option<u64>,
    },
    Answer {
        text: String,
    },
    Tool {
        name: String,
        text: String,
    },
    FileChangeSummary {
        files: Vec<String>,
        text: String,
    },
}

impl PartBody {
    pub fn empty(kind: PartKind) -> Self {
        match kind {
            PartKind::Thinking => PartBody::Thinking {
                text: String::new(),
                duration_ms: None,
            },
            PartKind::Answer => PartBody::Answer {
                text: String::new(),
            },
            PartKind::Tool => PartBody::Tool {
                name: String::new(),
                text: String::new(),
            },
            PartKind::FileChangeSummary => PartBody::FileChangeSummary {
                files: Vec::new(),
                text: String::new(),
            },
        }
    }

    pub fn kind(&self) -> PartKind {
        match self {
            PartBody::Thinking { .. } => PartKind::Thinking,
            PartBody::Answer { .. } => PartKind::Answer,
            PartBody::Tool { .. } => PartKind::Tool,
            PartBody::FileChangeSummary { .. } => PartKind::FileChangeSummary,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            PartBody::Thinking { text, .. }
            | PartBody::Answer { text }
            | PartBody::Tool { text, .. }
            | PartBody::FileChangeSummary { text, .. } => text,
        }
    }

    pub fn text_mut(&mut self) -> &mut String {
        match self {
            PartBody::Thinking { text, .. }
            | PartBody::Answer { text }
            | PartBody::Tool { text, .. }
            | PartBody::FileChangeSummary { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub key: String,
    pub body: PartBody,
    /// Recomputed by the visibility pass before every render.
    pub active: bool,
    /// Created by a delta that outran its defining event; the kind is a guess
    /// until an event carrying the wire type arrives.
    pub provisional: bool,
}

impl Part {
    pub fn new(key: impl Into<String>, body: PartBody) -> Self {
        Self {
            key: key.into(),
            body,
            active: false,
            provisional: false,
        }
    }

    pub fn kind(&self) -> PartKind {
        self.body.kind()
    }

    pub fn text(&self) -> &str {
        self.body.text()
    }

    /// Whitespace-only text counts as empty.
    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match &self.body {
            PartBody::Thinking { duration_ms, .. } => *duration_ms,
            _ => None,
        }
    }
}

/// Timing facts for one thinking part.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ThinkingClock {
    pub reported_start: Option<i64>,
    pub reported_end: Option<i64>,
    pub opened_at: Instant,
}

impl ThinkingClock {
    pub fn new() -> Self {
        Self {
            reported_start: None,
            reported_end: None,
            opened_at: Instant::now(),
        }
    }
}

/// Which part ended the thinking phase, and which thinking part was stamped.
#[derive(Debug, Clone)]
pub(crate) struct CloseOut {
    pub trigger: String,
    pub thinking: Option<String>,
}

/// Everything accumulated for one request/response cycle.
#[derive(Debug, Default)]
pub struct TurnState {
    pub parts: Vec<Part>,
    /// Every decoded event received during the turn, for diagnostics.
    pub events: Vec<Value>,
    /// Rows occupied by the block last painted for this turn.
    pub painted_lines: usize,
    pub(crate) started: bool,
    pub(crate) close_out: Option<CloseOut>,
    pub(crate) thinking_clocks: HashMap<String, ThinkingClock>,
    pub(crate) file_snapshots: HashMap<String, String>,
    pub(crate) summary_seq: u32,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: Value) {
        self.events.push(event);
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.parts.iter().position(|p| p.key == key)
    }

    pub fn part(&self, key: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.key == key)
    }

    pub fn active_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.active)
    }

    /// True when a turn-started signal is waiting for its first answer.
    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn has_content(&self) -> bool {
        self.parts.iter().any(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_body_kind_is_fixed_by_variant() {
        for kind in [
            PartKind::Thinking,
            PartKind::Answer,
            PartKind::Tool,
            PartKind::FileChangeSummary,
        ] {
            let body = PartBody::empty(kind);
            assert_eq!(body.kind(), kind);
            assert_eq!(body.text(), "");
        }
    }

    #[test]
    fn test_part_text_mut_and_empty() {
        let mut part = Part::new("p1", PartBody::empty(PartKind::Answer));
        assert!(part.is_empty());
        part.body.text_mut().push_str("  \n");
        assert!(part.is_empty());
        part.body.text_mut().push_str("hi");
        assert!(!part.is_empty());
        assert_eq!(part.text(), "  \nhi");
        assert!(!part.active);
    }

    #[test]
    fn test_turn_lookup() {
        let mut turn = TurnState::new();
        turn.parts.push(Part::new("a", PartBody::empty(PartKind::Tool)));
        turn.parts.push(Part::new("b", PartBody::empty(PartKind::Answer)));
        assert_eq!(turn.position("b"), Some(1));
        assert!(turn.part("c").is_none());
        assert!(!turn.has_content());
        assert_eq!(turn.painted_lines, 0);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(PartKind::FileChangeSummary.to_string(), "file-change-summary");
        assert_eq!(PartKind::Thinking.to_string(), "thinking");
    }
}
