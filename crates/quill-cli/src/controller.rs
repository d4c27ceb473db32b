//! Drives one conversation over the event feed.
//!
//! The controller owns the current turn, the renderer and every timer-like
//! piece of display state (spinner frame, retry countdown). The input loop
//! feeds it raw feed messages, send results and ticks; it never awaits.

use std::io::{self, Write};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use quill_core::{apply, compute_active, Error, SessionStatus, StreamEvent, TurnState};

use crate::debug_log::DebugLogger;
use crate::render::Renderer;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Streaming,
    Disconnected,
}

/// What the input loop should do after a controller call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    /// The turn is over (idle, cancelled or failed); the prompt may return.
    TurnComplete,
}

#[derive(Debug, Clone)]
struct RetryCountdown {
    message: Option<String>,
    next_ms: Option<i64>,
    attempt: Option<u32>,
}

type WidthFn = Box<dyn Fn() -> Option<usize> + Send>;

pub struct StreamController<W: Write> {
    renderer: Renderer<W>,
    turn: TurnState,
    session_id: Option<String>,
    state: ConnectionState,
    processing: bool,
    /// False once the turn ended; late events are then ignored.
    accepting: bool,
    detailed: bool,
    retry: Option<RetryCountdown>,
    spinner_frame: usize,
    interactive: bool,
    width: WidthFn,
    debug_logger: Option<Arc<DebugLogger>>,
}

fn terminal_width() -> Option<usize> {
    crossterm::terminal::size()
        .ok()
        .map(|(w, _)| w as usize)
        .filter(|w| *w > 0)
}

impl<W: Write> StreamController<W> {
    /// `interactive` is false when stdout is not a terminal; the block is
    /// then painted once per turn instead of on every update.
    pub fn new(renderer: Renderer<W>, interactive: bool) -> Self {
        Self {
            renderer,
            turn: TurnState::new(),
            session_id: None,
            state: ConnectionState::Connecting,
            processing: false,
            accepting: false,
            detailed: false,
            retry: None,
            spinner_frame: 0,
            interactive,
            width: Box::new(terminal_width),
            debug_logger: None,
        }
    }

    #[cfg(test)]
    pub fn with_width_provider(
        mut self,
        width: impl Fn() -> Option<usize> + Send + 'static,
    ) -> Self {
        self.width = Box::new(width);
        self
    }

    pub fn with_debug_logger(mut self, logger: Arc<DebugLogger>) -> Self {
        self.debug_logger = Some(logger);
        self
    }

    pub fn with_detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    pub fn set_session(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
    }

    #[cfg(test)]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// True while something on screen animates.
    pub fn needs_tick(&self) -> bool {
        self.processing || self.retry.is_some()
    }

    #[cfg(test)]
    pub fn turn(&self) -> &TurnState {
        &self.turn
    }

    #[cfg(test)]
    pub fn renderer(&self) -> &Renderer<W> {
        &self.renderer
    }

    #[cfg(test)]
    pub fn renderer_mut(&mut self) -> &mut Renderer<W> {
        &mut self.renderer
    }

    pub fn on_open(&mut self) {
        if self.state != ConnectionState::Streaming {
            debug!("Event feed streaming");
        }
        self.state = ConnectionState::Streaming;
    }

    /// Start a new turn; the previous turn's state is discarded.
    pub fn begin_turn(&mut self) {
        self.turn = TurnState::new();
        self.processing = true;
        self.accepting = true;
        self.retry = None;
        self.spinner_frame = 0;
        self.renderer.set_footer(None);
    }

    /// Handle one raw feed message. Malformed messages are dropped.
    pub fn handle_message(&mut self, data: &str, now_ms: i64) -> io::Result<Signal> {
        if self.state == ConnectionState::Connecting {
            self.on_open();
        }

        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Dropping malformed feed message");
                if let Some(logger) = &self.debug_logger {
                    logger.log_dropped(data, &e.to_string());
                }
                return Ok(Signal::Continue);
            }
        };
        if let Some(logger) = &self.debug_logger {
            logger.log_event(&value);
        }

        let event = match StreamEvent::from_value(value.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable feed event");
                if let Some(logger) = &self.debug_logger {
                    logger.log_dropped(data, &e.to_string());
                }
                return Ok(Signal::Continue);
            }
        };

        if let Some(session) = &self.session_id {
            if !event.is_for_session(session) {
                trace!(session = ?event.session_id(), "Ignoring event for another session");
                return Ok(Signal::Continue);
            }
        }
        if !self.accepting {
            trace!("Ignoring event outside an active turn");
            return Ok(Signal::Continue);
        }
        self.turn.record_event(value);

        match &event {
            StreamEvent::Status {
                status: SessionStatus::Idle,
                ..
            } => return self.finish_turn(),
            StreamEvent::Status {
                status:
                    SessionStatus::Retry {
                        message,
                        next,
                        attempt,
                    },
                ..
            } => {
                debug!(?next, ?attempt, "Server retrying");
                self.retry = Some(RetryCountdown {
                    message: message.clone(),
                    next_ms: *next,
                    attempt: *attempt,
                });
                self.repaint(now_ms)?;
                return Ok(Signal::Continue);
            }
            _ => {}
        }

        let changed = apply(&mut self.turn, &event);
        let resumed = matches!(
            event,
            StreamEvent::Status {
                status: SessionStatus::Busy,
                ..
            }
        );
        // Only progress ends a retry wait; unknown events and ignored parts do not.
        let cancelled_retry = (changed || resumed) && self.retry.take().is_some();
        if cancelled_retry {
            debug!("Retry countdown cancelled by new event");
        }
        if changed || cancelled_retry {
            self.repaint(now_ms)?;
        }
        Ok(Signal::Continue)
    }

    /// Outcome of the in-flight send. Success changes nothing: the turn
    /// ends when the server reports idle.
    pub fn on_send_result(&mut self, result: Result<(), Error>) -> io::Result<Signal> {
        if !self.processing {
            if let Err(e) = &result {
                debug!(error = %e, "Ignoring send result for a finished turn");
            }
            return Ok(Signal::Continue);
        }
        match result {
            Ok(()) => {
                debug!("Send completed");
                Ok(Signal::Continue)
            }
            Err(Error::Cancelled) => {
                info!("Request cancelled");
                if let Some(logger) = &self.debug_logger {
                    logger.log_cancelled(&self.turn);
                }
                self.abandon_turn()?;
                self.renderer.notice("Request cancelled")?;
                Ok(Signal::TurnComplete)
            }
            Err(e) => {
                error!(error = %e, "Send failed");
                if let Some(logger) = &self.debug_logger {
                    logger.log_send_failed(&e.to_string());
                }
                self.abandon_turn()?;
                self.renderer.notice(&format!("Error: {}", e))?;
                Ok(Signal::TurnComplete)
            }
        }
    }

    /// The feed ended or failed. No reconnect is attempted.
    pub fn on_disconnect(&mut self, reason: &str) -> io::Result<()> {
        warn!(reason = %reason, "Event feed disconnected");
        self.state = ConnectionState::Disconnected;
        if let Some(logger) = &self.debug_logger {
            logger.log_disconnected(reason);
        }
        if self.processing {
            self.abandon_turn()?;
        }
        self.renderer
            .notice(&format!("Connection error: {}", reason))
    }

    /// Advance the spinner and the retry countdown.
    pub fn tick(&mut self, now_ms: i64) -> io::Result<()> {
        if !self.needs_tick() {
            return Ok(());
        }
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER.len();
        self.repaint(now_ms)
    }

    /// Flip detailed view and show the last turn under the new policy.
    pub fn toggle_details(&mut self) -> io::Result<bool> {
        self.detailed = !self.detailed;
        debug!(detailed = self.detailed, "Toggled detailed view");
        compute_active(&mut self.turn, self.detailed);
        let width = (self.width)();
        self.renderer.render(&mut self.turn, width)?;
        if !self.processing {
            self.renderer.commit(&mut self.turn);
        }
        Ok(self.detailed)
    }

    fn finish_turn(&mut self) -> io::Result<Signal> {
        debug!(parts = self.turn.parts.len(), "Turn complete");
        if let Some(logger) = &self.debug_logger {
            logger.log_turn_complete(&self.turn);
        }
        self.processing = false;
        self.accepting = false;
        self.retry = None;
        self.settle()?;
        Ok(Signal::TurnComplete)
    }

    fn abandon_turn(&mut self) -> io::Result<()> {
        self.processing = false;
        self.accepting = false;
        self.retry = None;
        self.settle()
    }

    /// Final paint without footer, then leave the block in scrollback.
    fn settle(&mut self) -> io::Result<()> {
        self.renderer.set_footer(None);
        compute_active(&mut self.turn, self.detailed);
        let width = (self.width)();
        self.renderer.render(&mut self.turn, width)?;
        self.renderer.commit(&mut self.turn);
        Ok(())
    }

    fn repaint(&mut self, now_ms: i64) -> io::Result<()> {
        if !self.interactive {
            return Ok(());
        }
        let footer = self.footer(now_ms);
        self.renderer.set_footer(footer);
        compute_active(&mut self.turn, self.detailed);
        let width = (self.width)();
        self.renderer.render(&mut self.turn, width)
    }

    fn footer(&mut self, now_ms: i64) -> Option<String> {
        let frame = SPINNER[self.spinner_frame];

        if let Some(retry) = &self.retry {
            let remaining_ms = retry.next_ms.map(|next| next - now_ms);
            match remaining_ms {
                Some(ms) if ms <= 0 => {
                    debug!("Retry countdown elapsed");
                    self.retry = None;
                }
                _ => {
                    let mut text = match remaining_ms {
                        Some(ms) => format!("{} Retrying in {}s", frame, (ms + 999) / 1000),
                        None => format!("{} Retrying", frame),
                    };
                    if let Some(attempt) = retry.attempt {
                        text.push_str(&format!(" (attempt {})", attempt));
                    }
                    if let Some(message) = &retry.message {
                        text.push_str(&format!(": {}", message));
                    }
                    return Some(text);
                }
            }
        }

        if self.processing {
            Some(format!("{} Working…", frame))
        } else {
            None
        }
    }
}
