//! Escape-sequence helpers.
//!
//! Everything that needs to know where a terminal escape sequence starts or
//! ends goes through this module. Visible width counts one column per char
//! outside escape tokens; there is no wide-character table.

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Length in bytes of the escape token starting at `pos`, if one starts there
/// and is complete.
///
/// Recognised forms: CSI (`ESC [` params final), string-terminated OSC, DCS
/// and APC (ended by BEL or `ESC \`), SS3 (`ESC O x`) and two-byte escapes.
pub fn escape_len_at(input: &str, pos: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if pos >= bytes.len() || bytes[pos] != ESC {
        return None;
    }
    let next = *bytes.get(pos + 1)?;

    match next {
        b'[' => csi_len(bytes, pos),
        b']' | b'P' | b'_' => string_terminated_len(bytes, pos),
        b'O' => match bytes.get(pos + 2) {
            Some(b) if b.is_ascii_graphic() => Some(3),
            _ => None,
        },
        0x20..=0x7e => Some(2),
        _ => None,
    }
}

fn csi_len(bytes: &[u8], pos: usize) -> Option<usize> {
    let mut idx = pos + 2;
    while idx < bytes.len() {
        let b = bytes[idx];
        if (0x40..=0x7e).contains(&b) {
            return Some(idx + 1 - pos);
        }
        if !(0x20..=0x3f).contains(&b) {
            // Not a parameter or intermediate byte: malformed sequence.
            return None;
        }
        idx += 1;
    }
    None
}

fn string_terminated_len(bytes: &[u8], pos: usize) -> Option<usize> {
    let mut idx = pos + 2;
    while idx < bytes.len() {
        if bytes[idx] == BEL {
            return Some(idx + 1 - pos);
        }
        if bytes[idx] == ESC && bytes.get(idx + 1) == Some(&b'\\') {
            return Some(idx + 2 - pos);
        }
        idx += 1;
    }
    None
}

/// Remove every complete escape token from `input`.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut idx = 0;
    while idx < input.len() {
        if let Some(len) = escape_len_at(input, idx) {
            idx += len;
            continue;
        }
        let Some(ch) = input[idx..].chars().next() else {
            break;
        };
        out.push(ch);
        idx += ch.len_utf8();
    }
    out
}

/// Number of terminal columns `input` occupies, ignoring escape tokens.
pub fn visible_width(input: &str) -> usize {
    let mut width = 0;
    let mut idx = 0;
    while idx < input.len() {
        if let Some(len) = escape_len_at(input, idx) {
            idx += len;
            continue;
        }
        let Some(ch) = input[idx..].chars().next() else {
            break;
        };
        width += 1;
        idx += ch.len_utf8();
    }
    width
}

/// Split `input` after `width` visible columns.
///
/// The split never lands inside an escape token. Escape tokens that sit between
/// the last kept column and the next printable char stay in the head, so a
/// colour that is still open simply carries over to the tail's line.
pub fn split_at_width(input: &str, width: usize) -> (&str, &str) {
    let mut columns = 0;
    let mut idx = 0;
    while idx < input.len() {
        if let Some(len) = escape_len_at(input, idx) {
            idx += len;
            continue;
        }
        if columns == width {
            break;
        }
        let Some(ch) = input[idx..].chars().next() else {
            break;
        };
        columns += 1;
        idx += ch.len_utf8();
    }
    input.split_at(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_len_at_csi() {
        let s = "ab\x1b[31mred";
        assert_eq!(escape_len_at(s, 0), None);
        assert_eq!(escape_len_at(s, 2), Some(5));
        assert_eq!(escape_len_at("\x1b[0m", 0), Some(4));
        assert_eq!(escape_len_at("\x1b[38;2;10;20;30m", 0), Some(16));
    }

    #[test]
    fn test_escape_len_at_incomplete() {
        assert_eq!(escape_len_at("\x1b[31", 0), None);
        assert_eq!(escape_len_at("\x1b", 0), None);
        assert_eq!(escape_len_at("\x1b]8;;http://x", 0), None);
    }

    #[test]
    fn test_escape_len_at_osc_terminators() {
        assert_eq!(escape_len_at("\x1b]0;title\x07rest", 0), Some(10));
        assert_eq!(escape_len_at("\x1b]0;title\x1b\\rest", 0), Some(11));
    }

    #[test]
    fn test_strip_and_width() {
        let s = "\x1b[1m\x1b[33mwarn\x1b[0m: disk";
        assert_eq!(strip_ansi(s), "warn: disk");
        assert_eq!(visible_width(s), 10);
        assert_eq!(visible_width(""), 0);
    }

    #[test]
    fn test_wide_chars_count_one_column() {
        assert_eq!(visible_width("日本語"), 3);
        assert_eq!(visible_width("🚀ok"), 3);
    }

    #[test]
    fn test_split_at_width_plain() {
        assert_eq!(split_at_width("12345678901", 10), ("1234567890", "1"));
        assert_eq!(split_at_width("abc", 10), ("abc", ""));
    }

    #[test]
    fn test_split_at_width_keeps_escape_whole() {
        let s = "\x1b[31m12345\x1b[0m678";
        let (head, tail) = split_at_width(s, 5);
        assert_eq!(head, "\x1b[31m12345\x1b[0m");
        assert_eq!(tail, "678");
        assert_eq!(visible_width(head), 5);
    }

    #[test]
    fn test_split_at_width_multibyte() {
        let (head, tail) = split_at_width("ééé", 2);
        assert_eq!(head, "éé");
        assert_eq!(tail, "é");
    }
}
