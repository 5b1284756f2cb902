use std::io::{self, Write};

use outrider_events::{LogLine, ScriptEvent, ScriptEventKind, StyleHint};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Everything a session hands to its consumers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// One transcript line, including mirrored category events
    Log(LogLine),
    Script(ScriptEvent),
    /// Feedback from the session itself, e.g. a script that failed to load
    Notice(String),
    /// The connection is gone; `None` for a clean close
    Ended { reason: Option<String> },
}

/// Trait for consuming session events - allows different front ends
pub trait EventConsumer: Send + 'static {
    fn handle_event(&mut self, event: SessionEvent);
}

/// Event consumer that prints the transcript to a writer (stdout for the CLI)
pub struct LoggingConsumer<W = io::Stdout> {
    out: W,
}

impl LoggingConsumer {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for LoggingConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> LoggingConsumer<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    fn print(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            warn!(target: "events", "Failed to write transcript: {}", e);
        }
    }
}

impl<W: Write + Send + 'static> EventConsumer for LoggingConsumer<W> {
    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Log(line) => {
                // Bare prompts only repeat what the status line already shows
                if line.has_style(&StyleHint::Prompt) && line.text.trim() == ">" {
                    return;
                }
                self.print(&line.text);
            }
            SessionEvent::Script(event) => match &event.kind {
                ScriptEventKind::Echo { .. }
                | ScriptEventKind::Failed { .. }
                | ScriptEventKind::Vars { .. } => self.print(&event.to_string()),
                ScriptEventKind::Started
                | ScriptEventKind::Completed { .. }
                | ScriptEventKind::Stopped => {
                    info!(target: "events", "{}", event);
                }
                _ => debug!(target: "events", "{}", event),
            },
            SessionEvent::Notice(text) => self.print(&text),
            SessionEvent::Ended { reason: None } => {
                info!(target: "events", "Connection closed");
            }
            SessionEvent::Ended {
                reason: Some(reason),
            } => {
                warn!(target: "events", "Connection lost: {}", reason);
            }
        }
    }
}

/// Event consumer that forwards every event to a channel, for front ends
/// that render on their own task
pub struct ChannelConsumer {
    tx: UnboundedSender<SessionEvent>,
}

impl ChannelConsumer {
    pub fn new(tx: UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }
}

impl EventConsumer for ChannelConsumer {
    fn handle_event(&mut self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}
