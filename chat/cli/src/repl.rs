//! Line-Oriented Terminal Surface
//!
//! Reads user input a line at a time and renders the controller's
//! [`SurfaceMessage`] stream to stdout.

use std::io::{self, Write};

use chat_core::{Conversation, ModelVariant, Role, SurfaceMessage};
use tokio::sync::mpsc;

/// A parsed input line
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Send text to the assistant
    Say(String),
    /// Show or switch the model variant
    Model(Option<ModelVariant>),
    /// List commands
    Help,
    /// Leave the session
    Quit,
    /// Slash command that is not recognised, or a bad argument
    Invalid(String),
}

impl Command {
    /// Parse one input line
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Say(trimmed.to_string());
        };

        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("quit" | "exit" | "q"), None) => Self::Quit,
            (Some("help" | "h" | "?"), None) => Self::Help,
            (Some("model" | "m"), None) => Self::Model(None),
            (Some("model" | "m"), Some(arg)) => match arg.parse() {
                Ok(variant) => Self::Model(Some(variant)),
                Err(e) => Self::Invalid(e),
            },
            _ => Self::Invalid(format!("unknown command '/{rest}' (try /help)")),
        }
    }
}

pub const HELP: &str = "\
Commands:
  /model                 show the selected model
  /model fast|reasoning  switch model for the next message
  /help                  show this help
  /quit                  leave";

/// Renders surface messages as they arrive
pub struct TerminalView {
    rx: mpsc::UnboundedReceiver<SurfaceMessage>,
    /// A bot line is open and has not been terminated
    line_open: bool,
    /// The thinking indicator is on screen
    thinking_shown: bool,
}

impl TerminalView {
    pub fn new(rx: mpsc::UnboundedReceiver<SurfaceMessage>) -> Self {
        Self {
            rx,
            line_open: false,
            thinking_shown: false,
        }
    }

    /// Print every turn already in the conversation (the greeting)
    pub fn print_history(&self, conversation: &Conversation) {
        for turn in conversation.turns() {
            let who = match turn.role {
                Role::User => "you",
                Role::Bot => "bot",
            };
            println!("{who}> {}", turn.content);
        }
    }

    /// Render everything queued so far
    pub fn drain(&mut self, conversation: &Conversation) -> io::Result<()> {
        let mut out = io::stdout().lock();

        while let Ok(message) = self.rx.try_recv() {
            match message {
                SurfaceMessage::TurnAppended {
                    role: Role::Bot,
                    content,
                    ..
                } => {
                    self.clear_thinking(&mut out)?;
                    write!(out, "bot> {content}")?;
                    self.line_open = true;
                }
                SurfaceMessage::Fragment { text, .. } => {
                    write!(out, "{text}")?;
                }
                SurfaceMessage::Elapsed { tenths } => {
                    if conversation.is_thinking() {
                        write!(out, "\r\x1b[2K... thinking {:.1}s", f64::from(tenths) / 10.0)?;
                        self.thinking_shown = true;
                    }
                }
                SurfaceMessage::StreamEnd { turn_id, .. } => {
                    self.clear_thinking(&mut out)?;
                    self.end_line(&mut out)?;
                    if let Some(turn) = turn_id.and_then(|id| conversation.get(&id).cloned()) {
                        let mut footer = turn.time_label();
                        if let Some(processed) = turn.processed_label() {
                            footer = format!("{footer} · {processed}");
                        }
                        writeln!(out, "     [{footer}]")?;
                    }
                }
                SurfaceMessage::StreamError { error, .. } => {
                    self.clear_thinking(&mut out)?;
                    self.end_line(&mut out)?;
                    writeln!(out, "error: {error}")?;
                }
                SurfaceMessage::TurnAppended { .. } | SurfaceMessage::Pending { .. } => {}
            }
        }

        out.flush()
    }

    fn clear_thinking(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.thinking_shown {
            write!(out, "\r\x1b[2K")?;
            self.thinking_shown = false;
        }
        Ok(())
    }

    fn end_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.line_open {
            writeln!(out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

/// Print the input prompt
pub fn prompt(variant: ModelVariant) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "[{}] you> ", variant.label())?;
    out.flush()
}
