//! Folds feed events into a [`TurnState`].

use tracing::trace;

use crate::event::{FileDiff, SessionStatus, StreamEvent, TimeSpan, WirePart};
use crate::part::{CloseOut, Part, PartBody, PartKind, ThinkingClock, TurnState};

/// Apply one event to `turn`. Returns true when the part list changed and a
/// repaint is worthwhile.
pub fn apply(turn: &mut TurnState, event: &StreamEvent) -> bool {
    match event {
        StreamEvent::PartUpdated { part, delta, .. } => apply_part(turn, part, delta.as_deref()),
        StreamEvent::PartDelta {
            part_id,
            delta,
            time,
            ..
        } => append_delta(turn, part_id, None, delta, time.as_ref()),
        StreamEvent::Diff { files, .. } => apply_diff(turn, files),
        StreamEvent::Status { status, .. } => {
            if *status == SessionStatus::Busy {
                turn.started = true;
            }
            false
        }
        StreamEvent::Unknown { kind } => {
            trace!(kind = %kind, "Ignoring unknown event type");
            false
        }
    }
}

fn apply_part(turn: &mut TurnState, part: &WirePart, delta: Option<&str>) -> bool {
    if part.is_step_start() {
        turn.started = true;
        return false;
    }
    let Some(kind) = part.kind() else {
        trace!(part_type = %part.part_type, "Ignoring unknown part type");
        return false;
    };

    if kind == PartKind::Thinking {
        note_thinking_time(turn, &part.id, part.time.as_ref());
    }

    match delta {
        Some(delta) => append_delta(turn, &part.id, Some(kind), delta, part.time.as_ref()),
        None => replace_part(turn, part, kind),
    }
}

fn replace_part(turn: &mut TurnState, part: &WirePart, kind: PartKind) -> bool {
    let text = part.display_text();
    let body = match kind {
        PartKind::Tool => PartBody::Tool {
            name: part.tool_name().to_string(),
            text,
        },
        _ => {
            let mut body = PartBody::empty(kind);
            *body.text_mut() = text;
            body
        }
    };

    if let Some(idx) = turn.position(&part.id) {
        if turn.parts[idx].provisional {
            settle_kind(turn, idx, body);
            if kind == PartKind::Answer && !turn.parts[idx].is_empty() {
                close_thinking(turn, &part.id, part.time.as_ref());
            }
            return true;
        }

        let existing = &mut turn.parts[idx];
        if existing.kind() != kind {
            trace!(key = %part.id, "Ignoring kind change for existing part");
            return false;
        }
        if existing.body == body {
            return false;
        }
        match (&mut existing.body, body) {
            (PartBody::Tool { name, text }, PartBody::Tool { name: n, text: t }) => {
                *name = n;
                *text = t;
            }
            (existing_body, body) => *existing_body.text_mut() = body.text().to_string(),
        }
        if kind == PartKind::Answer && !turn.parts[idx].is_empty() {
            close_thinking(turn, &part.id, part.time.as_ref());
        }
        return true;
    }

    if kind == PartKind::Answer && !body.text().is_empty() {
        close_thinking(turn, &part.id, part.time.as_ref());
    }
    insert_part(turn, &part.id, body);
    true
}

/// Give a provisional part the body of its defining event. Text collected from
/// earlier deltas is kept when the event carries none.
fn settle_kind(turn: &mut TurnState, idx: usize, mut body: PartBody) {
    let key = turn.parts[idx].key.clone();
    trace!(key = %key, kind = %body.kind(), "Settling provisional part");
    if body.text().is_empty() {
        *body.text_mut() = std::mem::take(turn.parts[idx].body.text_mut());
    }
    if body.kind() != PartKind::Answer {
        reopen_thinking(turn, &key);
    }
    let existing = &mut turn.parts[idx];
    existing.body = body;
    existing.provisional = false;
}

/// Extend the part for `key`, creating it first when the delta outran the
/// event that defines it.
fn append_delta(
    turn: &mut TurnState,
    key: &str,
    kind: Option<PartKind>,
    delta: &str,
    time: Option<&TimeSpan>,
) -> bool {
    let (idx, created) = match turn.position(key) {
        Some(idx) => {
            let retyped = match kind {
                Some(kind) if turn.parts[idx].provisional => {
                    settle_kind(turn, idx, PartBody::empty(kind));
                    true
                }
                _ => false,
            };
            (idx, retyped)
        }
        None => {
            let guessed = kind.is_none();
            let kind = kind.unwrap_or(PartKind::Answer);
            if kind == PartKind::Thinking {
                note_thinking_time(turn, key, time);
            }
            let idx = insert_part(turn, key, PartBody::empty(kind));
            turn.parts[idx].provisional = guessed;
            (idx, true)
        }
    };

    if delta.is_empty() {
        return created;
    }
    if turn.parts[idx].kind() == PartKind::Answer {
        close_thinking(turn, key, time);
    }
    turn.parts[idx].body.text_mut().push_str(delta);
    true
}

/// Append a new part, or coalesce a tool into a trailing tool part.
fn insert_part(turn: &mut TurnState, key: &str, body: PartBody) -> usize {
    if body.kind() == PartKind::Tool {
        if let Some(last) = turn.parts.last_mut() {
            if last.kind() == PartKind::Tool {
                last.key = key.to_string();
                last.body = body;
                return turn.parts.len() - 1;
            }
        }
    }
    turn.parts.push(Part::new(key, body));
    turn.parts.len() - 1
}

fn note_thinking_time(turn: &mut TurnState, key: &str, time: Option<&TimeSpan>) {
    let clock = turn
        .thinking_clocks
        .entry(key.to_string())
        .or_insert_with(ThinkingClock::new);
    if let Some(time) = time {
        if time.start.is_some() {
            clock.reported_start = time.start;
        }
        if time.end.is_some() {
            clock.reported_end = time.end;
        }
    }
}

/// Stamp the duration of the open thinking part once per turn-started signal.
/// `trigger` is the key of the answer part that ended the thinking phase.
fn close_thinking(turn: &mut TurnState, trigger: &str, answer_time: Option<&TimeSpan>) {
    if !turn.started {
        return;
    }
    turn.started = false;
    turn.close_out = Some(CloseOut {
        trigger: trigger.to_string(),
        thinking: None,
    });

    let Some(part) = turn
        .parts
        .iter_mut()
        .rev()
        .find(|p| p.kind() == PartKind::Thinking)
    else {
        return;
    };
    let PartBody::Thinking { duration_ms, .. } = &mut part.body else {
        return;
    };
    if duration_ms.is_some() {
        return;
    }
    let Some(clock) = turn.thinking_clocks.get(&part.key) else {
        return;
    };

    let end = clock
        .reported_end
        .or_else(|| answer_time.and_then(|t| t.start));
    let reported = match (clock.reported_start, end) {
        (Some(start), Some(end)) if end >= start => Some((end - start) as u64),
        _ => None,
    };
    let elapsed = reported.unwrap_or_else(|| clock.opened_at.elapsed().as_millis() as u64);
    trace!(key = %part.key, elapsed_ms = elapsed, "Closing thinking part");
    *duration_ms = Some(elapsed);
    turn.close_out = Some(CloseOut {
        trigger: trigger.to_string(),
        thinking: Some(part.key.clone()),
    });
}

/// Undo a close-out triggered by `key` once it turns out not to be an answer.
fn reopen_thinking(turn: &mut TurnState, key: &str) {
    if turn.close_out.as_ref().map(|c| c.trigger.as_str()) != Some(key) {
        return;
    }
    let Some(close_out) = turn.close_out.take() else {
        return;
    };
    trace!(trigger = %key, "Re-arming thinking close-out");
    turn.started = true;
    let Some(thinking) = close_out.thinking else {
        return;
    };
    if let Some(idx) = turn.position(&thinking) {
        if let PartBody::Thinking { duration_ms, .. } = &mut turn.parts[idx].body {
            *duration_ms = None;
        }
    }
}

fn apply_diff(turn: &mut TurnState, files: &[FileDiff]) -> bool {
    let mut changed: Vec<&FileDiff> = Vec::new();
    for file in files {
        let snapshot = file.snapshot();
        if turn.file_snapshots.get(&file.file) == Some(&snapshot) {
            continue;
        }
        turn.file_snapshots.insert(file.file.clone(), snapshot);
        changed.retain(|f| f.file != file.file);
        changed.push(file);
    }
    if changed.is_empty() {
        return false;
    }

    turn.summary_seq += 1;
    let text = changed
        .iter()
        .map(|f| format!("{}  +{} -{}", f.file, f.additions, f.deletions))
        .collect::<Vec<_>>()
        .join("\n");
    let body = PartBody::FileChangeSummary {
        files: changed.iter().map(|f| f.file.clone()).collect(),
        text,
    };
    turn.parts
        .push(Part::new(format!("diff-{}", turn.summary_seq), body));
    true
}
