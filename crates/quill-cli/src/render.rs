//! Incremental terminal renderer for a streaming turn.
//!
//! The block for the current turn is repainted in place: move the cursor up
//! over the previously painted rows, clear to the end of the screen, print the
//! new block and remember how many rows it took.

use std::io::{self, Write};

use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    style::Stylize,
    terminal::{Clear, ClearType},
};

use quill_core::{visible_width, wrap, Part, PartBody, TurnState};

pub const DEFAULT_WIDTH: usize = 80;

pub struct Renderer<W: Write> {
    out: W,
    default_width: usize,
    footer: Option<String>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            default_width: DEFAULT_WIDTH,
            footer: None,
        }
    }

    pub fn with_default_width(mut self, width: usize) -> Self {
        self.default_width = width.max(1);
        self
    }

    /// Line shown under the parts (spinner, retry countdown). Takes effect on
    /// the next render.
    pub fn set_footer(&mut self, footer: Option<String>) {
        self.footer = footer;
    }

    #[cfg(test)]
    pub fn footer(&self) -> Option<&str> {
        self.footer.as_deref()
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    #[cfg(test)]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Repaint the active parts of `turn`. `width` is the terminal width when
    /// known.
    pub fn render(&mut self, turn: &mut TurnState, width: Option<usize>) -> io::Result<()> {
        let clear = turn.painted_lines;
        if clear > 0 {
            let rows = u16::try_from(clear).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "painted block taller than terminal")
            })?;
            queue!(
                self.out,
                MoveUp(rows),
                MoveToColumn(0),
                Clear(ClearType::FromCursorDown)
            )?;
        }

        let lines = self.layout(turn, width);
        debug_assert!(
            lines
                .iter()
                .all(|l| visible_width(l) <= width.unwrap_or(self.default_width).max(1)),
            "wrapped line wider than the terminal"
        );
        if lines.is_empty() {
            turn.painted_lines = 0;
            if clear > 0 {
                self.out.flush()?;
            }
            return Ok(());
        }

        for line in &lines {
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()?;
        turn.painted_lines = lines.len();
        Ok(())
    }

    /// Leave the painted block in scrollback; the next render starts below it.
    pub fn commit(&mut self, turn: &mut TurnState) {
        turn.painted_lines = 0;
    }

    /// Print a one-line notice. The current block must be committed first.
    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text.red())?;
        self.out.flush()
    }

    /// Wrapped lines of the block for `turn`, labels and footer included.
    pub fn layout(&self, turn: &TurnState, width: Option<usize>) -> Vec<String> {
        let width = width.unwrap_or(self.default_width).max(1);
        let mut lines: Vec<String> = Vec::new();

        for part in turn.active_parts() {
            if part.is_empty() {
                continue;
            }
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.extend(wrap(&format_part(part), width));
        }

        if let Some(footer) = &self.footer {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.extend(wrap(&format!("{}", footer.as_str().dark_grey()), width));
        }

        lines
    }
}

fn format_part(part: &Part) -> String {
    match &part.body {
        PartBody::Thinking { text, duration_ms } => {
            let header = match duration_ms {
                Some(ms) => format!("Thought for {:.1}s", *ms as f64 / 1000.0),
                None => "Thinking…".to_string(),
            };
            let mut out = format!("{}", header.italic().dark_grey());
            for line in text.trim_end().lines() {
                out.push('\n');
                if !line.is_empty() {
                    out.push_str(&format!("{}", line.dim()));
                }
            }
            out
        }
        PartBody::Answer { text } => format!("{} {}", "●".cyan(), text.trim_end()),
        PartBody::Tool { text, .. } => format!("{} {}", "▶".yellow(), text.trim_end()),
        PartBody::FileChangeSummary { text, .. } => {
            format!("{}\n{}", "± Changes".bold(), text.trim_end())
        }
    }
}
