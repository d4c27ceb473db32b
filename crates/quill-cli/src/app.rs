//! The interactive loop: one task multiplexing the event feed, the in-flight
//! send, the display tick, Ctrl+C and prompt input.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::{Config as EditorConfig, Editor};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use quill_core::{AgentServer, Error, FeedEvent};

use crate::commands::{help_text, parse_command, ChatCommand};
use crate::controller::{ConnectionState, Signal, StreamController};
use crate::debug_log::DebugLogger;

type SendFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

pub struct AppOptions {
    pub session_id: String,
    /// Send this prompt, stream until idle, then return.
    pub one_shot: Option<String>,
    pub tick: Duration,
    pub history_path: Option<PathBuf>,
    pub debug_logger: Option<Arc<DebugLogger>>,
}

#[derive(Debug)]
enum InputLine {
    Text(String),
    Interrupt,
    Eof,
}

/// Line editor running on its own thread. It prompts once per permit.
struct InputHandle {
    permits: mpsc::UnboundedSender<()>,
    lines: mpsc::UnboundedReceiver<InputLine>,
}

impl InputHandle {
    fn grant(&self) {
        let _ = self.permits.send(());
    }
}

fn build_editor(history_path: Option<&Path>) -> rustyline::Result<Editor<(), FileHistory>> {
    let config = EditorConfig::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .build();
    let mut editor: Editor<(), FileHistory> = Editor::with_config(config)?;
    if let Some(path) = history_path {
        let _ = editor.load_history(path);
    }
    Ok(editor)
}

fn spawn_input(history_path: Option<PathBuf>) -> InputHandle {
    let (permit_tx, mut permit_rx) = mpsc::unbounded_channel::<()>();
    let (line_tx, line_rx) = mpsc::unbounded_channel::<InputLine>();

    std::thread::spawn(move || {
        let mut editor = match build_editor(history_path.as_deref()) {
            Ok(editor) => editor,
            Err(e) => {
                error!(error = %e, "Failed to initialise line editor");
                let _ = line_tx.send(InputLine::Eof);
                return;
            }
        };

        while permit_rx.blocking_recv().is_some() {
            let line = match editor.readline("you> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(&line);
                    if let Some(path) = &history_path {
                        let _ = editor.save_history(path);
                    }
                    InputLine::Text(line)
                }
                Err(ReadlineError::Interrupted) => InputLine::Interrupt,
                Err(ReadlineError::Eof) => InputLine::Eof,
                Err(e) => {
                    error!(error = %e, "Error reading input");
                    InputLine::Eof
                }
            };
            let eof = matches!(line, InputLine::Eof);
            if line_tx.send(line).is_err() || eof {
                break;
            }
        }
    });

    InputHandle {
        permits: permit_tx,
        lines: line_rx,
    }
}

fn grant_prompt(input: &Option<InputHandle>) {
    if let Some(handle) = input {
        handle.grant();
    }
}

async fn next_line(input: &mut Option<InputHandle>) -> Option<InputLine> {
    match input {
        Some(handle) => handle.lines.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_send(send: &mut Option<SendFuture>) -> Result<(), Error> {
    match send {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn start_turn<W: Write>(
    server: &Arc<dyn AgentServer>,
    controller: &mut StreamController<W>,
    options: &AppOptions,
    text: &str,
) -> (SendFuture, CancellationToken) {
    controller.begin_turn();
    if let Some(logger) = &options.debug_logger {
        logger.log_message_sent(&options.session_id, text);
    }

    let token = CancellationToken::new();
    let child = token.clone();
    let server = Arc::clone(server);
    let session = options.session_id.clone();
    let text = text.to_string();
    let fut: SendFuture =
        Box::pin(async move { server.send_message(&session, &text, child).await });
    (fut, token)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupted {
    Continue,
    TurnOver,
    Exit,
}

/// Ctrl+C: cancel the in-flight request, or leave one-shot mode when idle.
fn on_interrupt<W: Write>(
    controller: &mut StreamController<W>,
    cancel: Option<&CancellationToken>,
    send_pending: bool,
    one_shot: bool,
) -> std::io::Result<Interrupted> {
    if !controller.is_processing() {
        return Ok(if one_shot {
            Interrupted::Exit
        } else {
            Interrupted::Continue
        });
    }

    debug!("Cancelling in-flight request");
    if let Some(token) = cancel {
        token.cancel();
    }
    // Without a pending send nothing else will report it.
    if !send_pending && controller.on_send_result(Err(Error::Cancelled))? == Signal::TurnComplete {
        return Ok(Interrupted::TurnOver);
    }
    Ok(Interrupted::Continue)
}

/// Run until the user quits (or, in one-shot mode, until the turn ends).
pub async fn run<W: Write>(
    server: Arc<dyn AgentServer>,
    controller: &mut StreamController<W>,
    options: AppOptions,
) -> Result<()> {
    let mut feed = server
        .subscribe()
        .await
        .context("Failed to open event feed")?;
    let mut feed_open = true;
    let mut send: Option<SendFuture> = None;
    let mut cancel: Option<CancellationToken> = None;
    let one_shot = options.one_shot.is_some();

    let mut input = if one_shot {
        None
    } else {
        Some(spawn_input(options.history_path.clone()))
    };

    let mut ticker = tokio::time::interval(options.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    match &options.one_shot {
        Some(prompt) => {
            let (fut, token) = start_turn(&server, controller, &options, prompt);
            send = Some(fut);
            cancel = Some(token);
        }
        None => grant_prompt(&input),
    }

    loop {
        let turn_over = tokio::select! {
            item = feed.next(), if feed_open => match item {
                Some(Ok(FeedEvent::Open)) => {
                    controller.on_open();
                    false
                }
                Some(Ok(FeedEvent::Message(data))) => {
                    controller.handle_message(&data, now_ms())? == Signal::TurnComplete
                }
                Some(Err(e)) => {
                    feed_open = false;
                    let was_processing = controller.is_processing();
                    controller.on_disconnect(&e.to_string())?;
                    was_processing
                }
                None => {
                    feed_open = false;
                    let was_processing = controller.is_processing();
                    controller.on_disconnect("event feed closed")?;
                    was_processing
                }
            },
            result = wait_send(&mut send) => {
                send = None;
                controller.on_send_result(result)? == Signal::TurnComplete
            }
            _ = ticker.tick(), if controller.needs_tick() => {
                controller.tick(now_ms())?;
                false
            }
            _ = tokio::signal::ctrl_c() => {
                match on_interrupt(controller, cancel.as_ref(), send.is_some(), one_shot)? {
                    Interrupted::Exit => break,
                    Interrupted::TurnOver => true,
                    Interrupted::Continue => false,
                }
            }
            line = next_line(&mut input) => match line {
                Some(InputLine::Text(text)) => match parse_command(&text) {
                    ChatCommand::Quit => break,
                    ChatCommand::Help => {
                        println!("{}", help_text());
                        grant_prompt(&input);
                        false
                    }
                    ChatCommand::Details => {
                        let detailed = controller.toggle_details()?;
                        println!("Detailed view {}", if detailed { "on" } else { "off" });
                        grant_prompt(&input);
                        false
                    }
                    ChatCommand::Unknown(cmd) => {
                        eprintln!("Unknown command: {}. Type /help for available commands.", cmd);
                        grant_prompt(&input);
                        false
                    }
                    ChatCommand::Message(text) if text.is_empty() => {
                        grant_prompt(&input);
                        false
                    }
                    ChatCommand::Message(_) if controller.state() == ConnectionState::Disconnected => {
                        eprintln!("Not connected to the event feed; restart quill to reconnect.");
                        grant_prompt(&input);
                        false
                    }
                    ChatCommand::Message(text) => {
                        let (fut, token) = start_turn(&server, controller, &options, &text);
                        send = Some(fut);
                        cancel = Some(token);
                        false
                    }
                },
                Some(InputLine::Interrupt) => {
                    grant_prompt(&input);
                    false
                }
                Some(InputLine::Eof) | None => break,
            },
        };

        if turn_over {
            cancel = None;
            if one_shot {
                break;
            }
            grant_prompt(&input);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Renderer;
    use quill_core::strip_ansi;
    use quill_core::testing::MockServer;
    use serde_json::json;

    fn controller() -> StreamController<Vec<u8>> {
        StreamController::new(Renderer::new(Vec::new()), true).with_width_provider(|| Some(80))
    }

    fn options(prompt: &str) -> AppOptions {
        AppOptions {
            session_id: "mock-session".into(),
            one_shot: Some(prompt.into()),
            tick: Duration::from_millis(10),
            history_path: None,
            debug_logger: None,
        }
    }

    fn output(c: &StreamController<Vec<u8>>) -> String {
        strip_ansi(&String::from_utf8(c.renderer().get_ref().clone()).unwrap())
    }

    #[tokio::test]
    async fn test_one_shot_streams_until_idle() {
        let mock = Arc::new(MockServer::new());
        mock.queue_event(json!({"type": "status", "properties": {"status": {"type": "busy"}}}));
        mock.queue_event(json!({"type": "part.delta", "properties": {"partID": "a1", "delta": "Hello"}}));
        mock.queue_event(json!({"type": "part.delta", "properties": {"partID": "a1", "delta": " there"}}));
        mock.queue_event(json!({"type": "status", "properties": {"status": {"type": "idle"}}}));

        let mut c = controller();
        let server: Arc<dyn AgentServer> = mock.clone();
        run(server, &mut c, options("hi")).await.unwrap();

        assert_eq!(
            mock.last_sent(),
            Some(("mock-session".to_string(), "hi".to_string()))
        );
        assert!(!c.is_processing());
        assert!(output(&c).ends_with("● Hello there\n"));
    }

    #[tokio::test]
    async fn test_one_shot_feed_loss_ends_turn() {
        let mock = Arc::new(MockServer::new().with_hanging_sends());
        mock.queue_event(json!({"type": "part.delta", "properties": {"partID": "a1", "delta": "half"}}));

        let mut c = controller();
        let server: Arc<dyn AgentServer> = mock.clone();
        run(server, &mut c, options("hi")).await.unwrap();

        assert!(output(&c).contains("Connection error: event feed closed"));
        assert_eq!(c.turn().parts[0].text(), "half");
    }

    #[tokio::test]
    async fn test_one_shot_send_failure_reported() {
        let mock = Arc::new(MockServer::new().with_held_feed());
        mock.queue_send_result(Err(Error::api(500, "model unavailable")));

        let mut c = controller();
        let server: Arc<dyn AgentServer> = mock.clone();
        run(server, &mut c, options("hi")).await.unwrap();

        assert!(output(&c).contains("model unavailable"));
        assert!(!c.is_processing());
    }

    #[tokio::test]
    async fn test_interrupt_cancels_pending_send() {
        let mock = Arc::new(MockServer::new().with_hanging_sends());
        let server: Arc<dyn AgentServer> = mock.clone();
        let mut c = controller();
        let opts = options("hi");
        let (fut, token) = start_turn(&server, &mut c, &opts, "hi");

        let outcome = on_interrupt(&mut c, Some(&token), true, true).unwrap();
        assert_eq!(outcome, Interrupted::Continue);
        assert!(token.is_cancelled());

        let result = fut.await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(c.on_send_result(result).unwrap(), Signal::TurnComplete);
        assert_eq!(mock.send_count(), 1);
        assert!(output(&c).contains("Request cancelled"));
    }

    #[test]
    fn test_interrupt_without_pending_send_ends_turn() {
        let mut c = controller();
        c.begin_turn();
        let outcome = on_interrupt(&mut c, None, false, false).unwrap();
        assert_eq!(outcome, Interrupted::TurnOver);
        assert!(!c.is_processing());
        assert!(output(&c).contains("Request cancelled"));
    }

    #[test]
    fn test_interrupt_when_idle() {
        let mut c = controller();
        assert_eq!(on_interrupt(&mut c, None, false, true).unwrap(), Interrupted::Exit);
        assert_eq!(on_interrupt(&mut c, None, false, false).unwrap(), Interrupted::Continue);
        assert!(output(&c).is_empty());
    }
}
