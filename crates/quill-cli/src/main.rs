use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quill_client::ServerClient;
use quill_core::AgentServer;

mod app;
mod commands;
mod config;
mod controller;
mod debug_log;
mod render;

use app::AppOptions;
use config::{expand_path, Config};
use controller::StreamController;
use debug_log::DebugLogger;
use render::Renderer;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: every decoded stream event
    Trace,
    /// Verbose: HTTP requests, dropped events, turn transitions
    Debug,
    /// Standard: connection and cancellation
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "quill")]
#[command(author, version, about = "Quill: a streaming terminal client for agent servers", long_about = None)]
pub struct Cli {
    /// Prompt to send; streams the response and exits
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Agent server base URL (overrides config)
    #[arg(long, env = "QUILL_SERVER")]
    pub server: Option<String>,

    /// Existing session to attach to (overrides config)
    #[arg(long)]
    pub session: Option<String>,

    /// Show every part instead of the condensed view
    #[arg(long)]
    pub details: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write tracing output to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Record every stream event and turn summary to file (JSON-lines format)
    #[arg(long)]
    pub event_log: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let interactive = atty::is(atty::Stream::Stdout);

    // Resolve log level: --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    let filter = EnvFilter::new(log_level.as_filter());

    if interactive && cli.prompt.is_none() && cli.log_file.is_none() {
        // The repainted block owns the terminal: suppress tracing output
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init();
    } else if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = Config::load()?;
    apply_overrides(&cli, &mut config);

    match &cli.command {
        Some(Commands::Config) => show_config(&config),
        None => session_mode(&cli, &config, interactive).await,
    }
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    if let Some(session) = &cli.session {
        config.session_id = Some(session.clone());
    }
    if cli.details {
        config.detailed = true;
    }
    if let Some(path) = &cli.event_log {
        config.event_log = Some(path.clone());
    }
}

fn history_path() -> Option<PathBuf> {
    let dir = dirs::config_dir()?.join("quill");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history"))
}

async fn session_mode(cli: &Cli, config: &Config, interactive: bool) -> Result<()> {
    let server: Arc<dyn AgentServer> = Arc::new(ServerClient::new(config.server_url.clone()));

    let session_id = match &config.session_id {
        Some(id) => id.clone(),
        None => server
            .create_session()
            .await
            .with_context(|| format!("Failed to create a session on {}", config.server_url))?,
    };

    let debug_logger = match config.event_log_path() {
        Some(path) => Some(Arc::new(DebugLogger::new(&path).with_context(|| {
            format!("Failed to open event log: {}", path.display())
        })?)),
        None => None,
    };

    let renderer = Renderer::new(std::io::stdout()).with_default_width(config.default_width);
    let mut controller = StreamController::new(renderer, interactive).with_detailed(config.detailed);
    if let Some(logger) = &debug_logger {
        controller = controller.with_debug_logger(Arc::clone(logger));
    }
    controller.set_session(session_id.clone());

    if cli.prompt.is_none() {
        println!(
            "quill connected to {} (session {}). Type /help for commands.",
            config.server_url, session_id
        );
    }

    let options = AppOptions {
        session_id,
        one_shot: cli.prompt.clone(),
        tick: Duration::from_millis(config.tick_ms),
        history_path: history_path(),
        debug_logger,
    };

    app::run(server, &mut controller, options).await
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    println!("# Config file: {}", path.display());
    if !path.exists() {
        println!("# (not found, showing defaults)");
    }
    if let Some(log) = &config.event_log {
        println!("# Event log resolves to: {}", expand_path(log).display());
    }
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}
