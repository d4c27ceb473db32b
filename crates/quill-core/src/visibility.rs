//! Which parts of a turn get painted.

use crate::part::{PartKind, TurnState};

/// Recompute every part's `active` flag.
///
/// Walking newest to oldest, only the most recent thinking trace and the most
/// recent tool call of each run stay visible; an answer ends the run, so
/// transient parts older than it are judged afresh. Answers and file change
/// summaries are visible whenever they have text. `detailed` shows everything.
pub fn compute_active(turn: &mut TurnState, detailed: bool) {
    let mut seen_thinking = false;
    let mut seen_tool = false;

    for part in turn.parts.iter_mut().rev() {
        if detailed {
            part.active = true;
            continue;
        }
        if part.is_empty() {
            part.active = false;
            continue;
        }
        match part.kind() {
            PartKind::Thinking => {
                part.active = !seen_thinking;
                seen_thinking = true;
            }
            PartKind::Tool => {
                part.active = !seen_tool;
                seen_tool = true;
            }
            PartKind::Answer => {
                part.active = true;
                seen_thinking = false;
                seen_tool = false;
            }
            PartKind::FileChangeSummary => part.active = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::{Part, PartBody};

    fn part(key: &str, kind: PartKind, text: &str) -> Part {
        let mut body = PartBody::empty(kind);
        body.text_mut().push_str(text);
        Part::new(key, body)
    }

    fn turn_of(parts: Vec<Part>) -> TurnState {
        let mut turn = TurnState::new();
        turn.parts = parts;
        turn
    }

    fn active_keys(turn: &TurnState) -> Vec<&str> {
        turn.active_parts().map(|p| p.key.as_str()).collect()
    }

    #[test]
    fn test_only_latest_thinking_active() {
        let mut turn = turn_of(vec![
            part("r1", PartKind::Thinking, "first"),
            part("r2", PartKind::Thinking, "second"),
        ]);
        compute_active(&mut turn, false);
        assert_eq!(active_keys(&turn), vec!["r2"]);
    }

    #[test]
    fn test_only_latest_tool_active() {
        let mut turn = turn_of(vec![
            part("t1", PartKind::Tool, "read"),
            part("r1", PartKind::Thinking, "hmm"),
            part("t2", PartKind::Tool, "edit"),
        ]);
        compute_active(&mut turn, false);
        assert_eq!(active_keys(&turn), vec!["r1", "t2"]);
    }

    #[test]
    fn test_answer_resets_suppression() {
        let mut turn = turn_of(vec![
            part("r1", PartKind::Thinking, "old plan"),
            part("t1", PartKind::Tool, "read"),
            part("a1", PartKind::Answer, "Here is the file"),
            part("r2", PartKind::Thinking, "new plan"),
            part("t2", PartKind::Tool, "edit"),
            part("a2", PartKind::Answer, "Done"),
        ]);
        compute_active(&mut turn, false);
        assert_eq!(
            active_keys(&turn),
            vec!["r1", "t1", "a1", "r2", "t2", "a2"]
        );
    }

    #[test]
    fn test_summary_does_not_reset_run() {
        let mut turn = turn_of(vec![
            part("t1", PartKind::Tool, "write"),
            part("d1", PartKind::FileChangeSummary, "a.rs  +1 -0"),
            part("t2", PartKind::Tool, "bash"),
        ]);
        compute_active(&mut turn, false);
        assert_eq!(active_keys(&turn), vec!["d1", "t2"]);
    }

    #[test]
    fn test_empty_parts_inactive_and_not_counted() {
        let mut turn = turn_of(vec![
            part("r1", PartKind::Thinking, "real"),
            part("r2", PartKind::Thinking, ""),
            part("a1", PartKind::Answer, ""),
        ]);
        compute_active(&mut turn, false);
        assert_eq!(active_keys(&turn), vec!["r1"]);
    }

    #[test]
    fn test_detailed_marks_everything() {
        let mut turn = turn_of(vec![
            part("r1", PartKind::Thinking, "a"),
            part("r2", PartKind::Thinking, "b"),
            part("t1", PartKind::Tool, "c"),
            part("t2", PartKind::Tool, "d"),
        ]);
        compute_active(&mut turn, true);
        assert!(turn.parts.iter().all(|p| p.active));

        compute_active(&mut turn, false);
        assert_eq!(active_keys(&turn), vec!["r2", "t2"]);
    }
}
