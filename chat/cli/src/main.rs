//! Relay Chat - Terminal Chat Client
//!
//! A line-oriented surface for the chat core: type a message, watch the
//! answer stream in.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (socket relay, fast model)
//! relay-chat
//!
//! # Managed relay with the reasoning model
//! GEMINI_API_KEY=... relay-chat --relay managed --variant reasoning
//!
//! # With config file
//! relay-chat --config ~/.config/relay-chat/chat.toml
//!
//! # Verbose logging (to stderr)
//! RUST_LOG=debug relay-chat
//! ```
//!
//! # Signals
//!
//! - `SIGINT`: leave the session

mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use chat_core::{
    build_relay, load_config, load_config_from_path, ConfigOverrides, ConversationController,
    ModelVariant, Relay, RelayKind, SubmitError,
};

use repl::{Command, TerminalView, HELP};

/// Relay Chat - streaming chat assistant in the terminal
#[derive(Parser, Debug)]
#[command(name = "relay-chat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Relay to use (socket, managed)
    #[arg(short = 'r', long, value_name = "KIND")]
    relay: Option<RelayKind>,

    /// Model variant (fast, reasoning)
    #[arg(short = 'm', long, value_name = "VARIANT")]
    variant: Option<ModelVariant>,

    /// WebSocket proxy URL
    #[arg(long, value_name = "URL")]
    socket_url: Option<String>,

    /// Managed API base URL
    #[arg(long, value_name = "URL")]
    managed_url: Option<String>,

    /// Seconds to wait without a response fragment (0 = forever)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Start without the greeting
    #[arg(long)]
    no_greeting: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(relay) = self.relay {
            overrides = overrides.with_relay(relay);
        }
        if let Some(variant) = self.variant {
            overrides = overrides.with_variant(variant);
        }
        if let Some(url) = &self.socket_url {
            overrides = overrides.with_socket_url(url.clone());
        }
        if let Some(url) = &self.managed_url {
            overrides = overrides.with_managed_base_url(url.clone());
        }
        if let Some(secs) = self.timeout {
            overrides = overrides.with_stream_timeout_secs(secs);
        }
        if self.no_greeting {
            overrides = overrides.without_greeting();
        }
        overrides
    }
}

/// Initialize logging to stderr so stdout stays the conversation
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chat_cli={level},chat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

type Controller = ConversationController<dyn Relay>;

/// Drive one exchange to completion, rendering as it streams
///
/// Returns false if the user interrupted.
async fn run_exchange(controller: &mut Controller, view: &mut TerminalView) -> Result<bool> {
    loop {
        let pending = tokio::select! {
            pending = controller.process_next() => pending,
            _ = tokio::signal::ctrl_c() => {
                view.drain(controller.conversation())?;
                println!();
                return Ok(false);
            }
        };

        view.drain(controller.conversation())?;
        if !pending {
            return Ok(true);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = match &args.config {
        Some(path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    args.overrides().apply(&mut config);
    config.validate()?;

    info!(
        relay = %config.relay,
        variant = %config.default_variant,
        source = %config.source(),
        "Configuration loaded"
    );

    let relay = build_relay(&config).context("Failed to create relay")?;
    let (tx, rx) = mpsc::unbounded_channel();
    let mut controller =
        ConversationController::with_shared(relay, config.controller_config()).with_surface(tx);
    let mut view = TerminalView::new(rx);

    view.print_history(controller.conversation());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        repl::prompt(controller.variant())?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            // EOF
            println!();
            break;
        };

        match Command::parse(&line) {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Model(None) => println!("model: {}", controller.variant().label()),
            Command::Model(Some(variant)) => {
                controller.select_variant(variant);
                println!("model: {}", variant.label());
            }
            Command::Invalid(message) => println!("{message}"),
            Command::Say(text) => match controller.submit(&text) {
                Ok(()) => {
                    if !run_exchange(&mut controller, &mut view).await? {
                        break;
                    }
                }
                Err(SubmitError::Empty) => {}
                Err(e) => warn!(error = %e, "Submission refused"),
            },
        }
    }

    info!(turns = controller.conversation().len(), "Session ended");
    Ok(())
}
