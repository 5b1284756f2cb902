use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use outrider_client::config::ScriptingConfig;
use outrider_client::{GameStream, GlobalVariables, SendCommand, Signal, Subscription};
use outrider_events::{CommandOrigin, LogLine, ScriptEvent, ScriptEventKind};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::matcher::Matcher;
use super::state::{Control, ScriptState};
use crate::compiler::{Op, Program, Target};
use crate::error::RuntimeError;
use crate::interpolation::interpolate;

pub(crate) type Locals = Arc<Mutex<BTreeMap<String, String>>>;

/// How a script run ended without an error
enum Outcome {
    Completed,
    Stopped,
}

/// Everything one script task needs; consumed by [`ScriptRun::run`]
pub(crate) struct ScriptRun {
    pub name: String,
    pub program: Program,
    pub locals: Locals,
    pub sender: Arc<dyn SendCommand>,
    pub stream: GameStream,
    pub globals: GlobalVariables,
    pub config: ScriptingConfig,
    pub events: mpsc::UnboundedSender<ScriptEvent>,
    pub control: watch::Receiver<Control>,
    pub state: watch::Sender<ScriptState>,
}

impl ScriptRun {
    pub async fn run(mut self) {
        let started = Instant::now();
        self.set_state(ScriptState::Running);
        self.notify(None, ScriptEventKind::Started);
        info!(target: "scripting", "Script {} started", self.name);

        let mut pc = 0;
        match self.execute(&mut pc).await {
            Ok(Outcome::Completed) => {
                let elapsed = started.elapsed();
                self.set_state(ScriptState::Completed);
                info!(target: "scripting", "Script {} completed in {:.2}s", self.name, elapsed.as_secs_f64());
                self.notify(None, ScriptEventKind::Completed { elapsed });
            }
            Ok(Outcome::Stopped) => {
                self.set_state(ScriptState::Stopped);
                info!(target: "scripting", "Script {} stopped", self.name);
                self.notify(self.line_at(pc), ScriptEventKind::Stopped);
            }
            Err(error) => {
                self.set_state(ScriptState::Stopped);
                warn!(target: "scripting", "Script {} failed: {}", self.name, error);
                self.notify(
                    self.line_at(pc),
                    ScriptEventKind::Failed {
                        error: error.to_string(),
                    },
                );
            }
        }
    }

    /// Source line of the instruction that ran last
    fn line_at(&self, pc: usize) -> Option<usize> {
        pc.checked_sub(1)
            .and_then(|i| self.program.get(i))
            .map(|i| i.line)
    }

    async fn execute(&mut self, pc: &mut usize) -> Result<Outcome, RuntimeError> {
        loop {
            if !self.checkpoint().await {
                return Ok(Outcome::Stopped);
            }
            let Some(instruction) = self.program.get(*pc).cloned() else {
                return Ok(Outcome::Completed);
            };
            *pc += 1;
            let line = instruction.line;

            match instruction.op {
                Op::Script { .. } | Op::Pound { .. } | Op::Highlight(_) => {}
                Op::Label { name } => {
                    debug!(target: "scripting", "{}:{} passing label {}", self.name, line, name);
                    self.notify(Some(line), ScriptEventKind::Label { name });
                }
                Op::Put { text } => {
                    let text = self.interpolate(&text)?;
                    let command = self.program.expand_alias(&text, line);
                    let origin = CommandOrigin {
                        script: self.name.clone(),
                        line,
                    };
                    self.sender
                        .send_from(&command, origin)
                        .map_err(|e| RuntimeError::Transport(e.to_string()))?;
                    self.notify(Some(line), ScriptEventKind::Sent { command });
                }
                Op::Echo { text } => {
                    let text = self.interpolate(&text)?;
                    self.notify(Some(line), ScriptEventKind::Echo { text });
                }
                Op::Goto { target } => {
                    *pc = self.resolve(&target, line)?;
                    tokio::task::yield_now().await;
                }
                Op::Equals { lhs, rhs, target } => {
                    if self.interpolate(&lhs)? == self.interpolate(&rhs)? {
                        *pc = self.resolve(&target, line)?;
                        tokio::task::yield_now().await;
                    }
                }
                Op::Var { name } => {
                    let value = self.globals.get(&name).unwrap_or_default();
                    self.locals().insert(name, value);
                }
                Op::SetVariable { name, value } => {
                    let value = self.interpolate(&value)?;
                    debug!(target: "scripting", "{}:{} {} = {:?}", self.name, line, name, value);
                    self.globals.set(name, value);
                }
                Op::Pause { seconds } => {
                    let seconds = seconds.unwrap_or(self.config.default_pause_secs);
                    let duration = Duration::try_from_secs_f64(seconds).map_err(|_| {
                        RuntimeError::InvalidPause {
                            line,
                            seconds: seconds.to_string(),
                        }
                    })?;
                    self.set_state(ScriptState::Paused);
                    self.notify(Some(line), ScriptEventKind::Paused { seconds });

                    if self.sleep_unless_stopped(duration).await {
                        return Ok(Outcome::Stopped);
                    }
                    // Then whatever is left of the character's roundtime
                    if let Some(roundtime) = self.roundtime() {
                        debug!(
                            target: "scripting",
                            "{}:{} waiting out {:.1}s of roundtime", self.name, line, roundtime.as_secs_f64()
                        );
                        if self.sleep_unless_stopped(roundtime).await {
                            return Ok(Outcome::Stopped);
                        }
                    }
                    self.set_state(ScriptState::Running);
                }
                Op::WaitFor { pattern } => {
                    let pattern = self.interpolate(&pattern)?;
                    let matcher = Matcher::new(&pattern, self.config.match_mode)?;
                    // Only lines arriving from now on count
                    let mut log = self.stream.log.subscribe_new();
                    self.set_state(ScriptState::AwaitingEvent);
                    self.notify(Some(line), ScriptEventKind::Waiting { pattern });

                    let result = tokio::select! {
                        biased;
                        result = wait_for_match(&mut log, &matcher) => Some(result),
                        _ = stop_requested(&mut self.control) => None,
                    };
                    match result {
                        Some(Ok(line)) => {
                            debug!(target: "scripting", "{} matched {:?}", self.name, line.text);
                        }
                        Some(Err(e)) => return Err(e),
                        None => return Ok(Outcome::Stopped),
                    }
                    self.set_state(ScriptState::Running);
                }
            }
        }
    }

    /// Wait out a hold request. Returns false when the script should stop.
    async fn checkpoint(&mut self) -> bool {
        loop {
            let control = *self.control.borrow_and_update();
            match control {
                Control::Run => {
                    self.set_state(ScriptState::Running);
                    return true;
                }
                Control::Stop => return false,
                Control::Hold => {
                    self.set_state(ScriptState::Paused);
                    // The engine went away
                    if self.control.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Returns true when a stop arrived first
    async fn sleep_unless_stopped(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = stop_requested(&mut self.control) => true,
        }
    }

    /// Remaining roundtime from the store, if any
    fn roundtime(&self) -> Option<Duration> {
        let seconds = self.globals.get("roundtime")?.trim().parse::<f64>().ok()?;
        if seconds > 0.0 {
            Duration::try_from_secs_f64(seconds).ok()
        } else {
            None
        }
    }

    fn resolve(&self, target: &Target, line: usize) -> Result<usize, RuntimeError> {
        match target {
            Target::Resolved { index, .. } => Ok(*index),
            Target::Dynamic(text) => {
                let label = self.interpolate(text)?;
                self.program
                    .label(&label)
                    .ok_or(RuntimeError::UnknownLabel { line, label })
            }
        }
    }

    fn interpolate(&self, text: &str) -> Result<String, RuntimeError> {
        interpolate(text, &self.locals(), &self.globals)
    }

    fn locals(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.locals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ScriptState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn notify(&self, line: Option<usize>, kind: ScriptEventKind) {
        let _ = self.events.send(ScriptEvent::new(self.name.clone(), line, kind));
    }
}

/// Resolves once a stop is requested or the engine is gone
async fn stop_requested(control: &mut watch::Receiver<Control>) {
    loop {
        if *control.borrow_and_update() == Control::Stop {
            return;
        }
        if control.changed().await.is_err() {
            return;
        }
    }
}

async fn wait_for_match(
    log: &mut Subscription<LogLine>,
    matcher: &Matcher,
) -> Result<LogLine, RuntimeError> {
    loop {
        match log.next().await {
            Some(Signal::Next(line)) => {
                if matcher.is_match(&line.text) {
                    return Ok(line);
                }
            }
            Some(Signal::Error(reason)) => return Err(RuntimeError::StreamEnded(reason)),
            Some(Signal::Completed) | None => {
                return Err(RuntimeError::StreamEnded("stream completed".to_string()))
            }
        }
    }
}
