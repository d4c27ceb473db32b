//! Width- and escape-aware line wrapping.
//!
//! Escape sequences are only handled through `crate::ansi`: `escape_len_at`
//! steps over a token while splitting words, `visible_width` and
//! `split_at_width` measure and cut. Nothing here parses a token itself.

use crate::ansi::{escape_len_at, split_at_width, visible_width};

/// Wrap `text` into display lines no wider than `width` visible columns.
///
/// Explicit newlines are honoured first (a single trailing newline adds no
/// line, a blank line adds exactly one empty entry), carriage returns are
/// dropped, and each segment is packed word by word. Words longer than
/// `width` are hard-split. Empty input yields a single empty line.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let cleaned: String = text.chars().filter(|c| *c != '\r').collect();
    let body = cleaned.strip_suffix('\n').unwrap_or(&cleaned);

    let mut lines = Vec::new();
    for segment in body.split('\n') {
        wrap_segment(segment, width, &mut lines);
    }
    lines
}

fn wrap_segment(segment: &str, width: usize, out: &mut Vec<String>) {
    let first_out = out.len();
    let mut line = String::new();
    let mut line_width = 0usize;
    let mut at_segment_start = true;

    for (gap, word) in words(segment) {
        let word_width = visible_width(word);

        if !line.is_empty() && line_width + gap.len() + word_width > width {
            out.push(std::mem::take(&mut line));
            line_width = 0;
        }

        let lead = match (line.is_empty(), at_segment_start) {
            // Indentation survives only on the segment's first line, and only
            // while it leaves room for the word.
            (true, true) if gap.len() + word_width <= width => gap,
            (true, _) => "",
            (false, _) => gap,
        };
        at_segment_start = false;

        if line_width + lead.len() + word_width <= width {
            line.push_str(lead);
            line.push_str(word);
            line_width += lead.len() + word_width;
            continue;
        }

        let mut rest = word;
        while visible_width(rest) > width {
            let (head, tail) = split_at_width(rest, width);
            out.push(head.to_string());
            rest = tail;
        }
        line = rest.to_string();
        line_width = visible_width(rest);
    }

    if !line.is_empty() || out.len() == first_out {
        out.push(line);
    }
}

/// Split a segment into `(preceding spaces, word)` pairs. Spaces inside an
/// escape token never separate words.
fn words(segment: &str) -> Vec<(&str, &str)> {
    let mut result = Vec::new();
    let mut idx = 0;
    let len = segment.len();

    while idx < len {
        let gap_start = idx;
        while idx < len && segment.as_bytes()[idx] == b' ' {
            idx += 1;
        }
        let gap = &segment[gap_start..idx];
        if idx >= len {
            break;
        }

        let word_start = idx;
        while idx < len {
            if let Some(esc) = escape_len_at(segment, idx) {
                idx += esc;
                continue;
            }
            if segment.as_bytes()[idx] == b' ' {
                break;
            }
            let Some(ch) = segment[idx..].chars().next() else {
                break;
            };
            idx += ch.len_utf8();
        }
        result.push((gap, &segment[word_start..idx]));
    }

    result
}
