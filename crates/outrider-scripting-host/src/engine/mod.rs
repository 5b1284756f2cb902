//! Runs compiled scripts as independent tokio tasks
//!
//! Each script gets a control channel (run, hold, stop) and publishes its
//! [`ScriptState`] on a watch channel. Stop and hold requests are honoured at
//! the next instruction boundary, and immediately while a script sits in
//! `PAUSE` or `WAITFOR`.

mod matcher;
mod script_runner;
mod state;

pub use matcher::Matcher;
pub use state::ScriptState;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use outrider_client::config::ScriptingConfig;
use outrider_client::{GameStream, GlobalVariables, SendCommand};
use outrider_events::{ScriptEvent, ScriptEventKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::compiler::{compile, CompileError, Program};
use script_runner::{Locals, ScriptRun};
use state::Control;

struct ScriptHandle {
    control: watch::Sender<Control>,
    state: watch::Receiver<ScriptState>,
    locals: Locals,
    task: JoinHandle<()>,
}

impl ScriptHandle {
    fn current(&self) -> ScriptState {
        *self.state.borrow()
    }
}

/// Starts, stops, pauses, resumes and inspects running scripts
pub struct ScriptEngine {
    sender: Arc<dyn SendCommand>,
    stream: GameStream,
    globals: GlobalVariables,
    config: ScriptingConfig,
    events_tx: mpsc::UnboundedSender<ScriptEvent>,
    scripts: HashMap<String, ScriptHandle>,
}

impl ScriptEngine {
    /// Create an engine and the channel its script notifications arrive on
    pub fn new(
        sender: Arc<dyn SendCommand>,
        stream: GameStream,
        globals: GlobalVariables,
        config: ScriptingConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ScriptEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = Self {
            sender,
            stream,
            globals,
            config,
            events_tx,
            scripts: HashMap::new(),
        };
        (engine, events_rx)
    }

    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    /// Start `program` under `name`. A script already running under that
    /// name is stopped first. `args` become `%1`, `%2`, … and `%0` holds
    /// all of them joined by spaces.
    pub fn start(&mut self, name: &str, program: Program, args: &[String]) {
        if self.stop(name) {
            debug!(target: "scripting", "Replacing running script {}", name);
        }

        let mut locals = BTreeMap::new();
        locals.insert("0".to_string(), args.join(" "));
        for (i, arg) in args.iter().enumerate() {
            locals.insert((i + 1).to_string(), arg.clone());
        }
        let locals: Locals = Arc::new(Mutex::new(locals));

        let (control_tx, control_rx) = watch::channel(Control::Run);
        let (state_tx, state_rx) = watch::channel(ScriptState::Ready);

        let run = ScriptRun {
            name: name.to_string(),
            program,
            locals: Arc::clone(&locals),
            sender: Arc::clone(&self.sender),
            stream: self.stream.clone(),
            globals: self.globals.clone(),
            config: self.config.clone(),
            events: self.events_tx.clone(),
            control: control_rx,
            state: state_tx,
        };
        let task = tokio::spawn(run.run());

        self.scripts.insert(
            name.to_string(),
            ScriptHandle {
                control: control_tx,
                state: state_rx,
                locals,
                task,
            },
        );
    }

    /// Compile `source` and start it
    pub fn start_source(
        &mut self,
        name: &str,
        source: &str,
        args: &[String],
    ) -> Result<(), CompileError> {
        let program = compile(source)?;
        self.start(name, program, args);
        Ok(())
    }

    /// Request a stop. Returns false if no live script has that name.
    pub fn stop(&mut self, name: &str) -> bool {
        self.request(name, Control::Stop)
    }

    /// Hold a script at its next instruction boundary
    pub fn pause(&mut self, name: &str) -> bool {
        self.request(name, Control::Hold)
    }

    pub fn resume(&mut self, name: &str) -> bool {
        self.request(name, Control::Run)
    }

    fn request(&mut self, name: &str, control: Control) -> bool {
        match self.scripts.get(name) {
            Some(handle) if !handle.current().is_terminal() => {
                handle.control.send_replace(control);
                true
            }
            _ => false,
        }
    }

    pub fn stop_all(&mut self) {
        let names: Vec<String> = self.scripts.keys().cloned().collect();
        for name in names {
            self.stop(&name);
        }
    }

    /// Local bindings of a script, also reported as a `Vars` notification
    pub fn vars(&self, name: &str) -> Option<BTreeMap<String, String>> {
        let handle = self.scripts.get(name)?;
        let variables = handle
            .locals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let _ = self.events_tx.send(ScriptEvent::new(
            name,
            None,
            ScriptEventKind::Vars {
                variables: variables.clone(),
            },
        ));
        Some(variables)
    }

    pub fn state(&self, name: &str) -> Option<ScriptState> {
        self.scripts.get(name).map(ScriptHandle::current)
    }

    /// Names of scripts that have not finished, sorted
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scripts
            .iter()
            .filter(|(_, h)| !h.current().is_terminal())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Wait for a script to reach a terminal state
    pub async fn wait(&self, name: &str) -> Option<ScriptState> {
        let mut state = self.scripts.get(name)?.state.clone();
        let result = state.wait_for(|s| s.is_terminal()).await;
        match result {
            Ok(s) => Some(*s),
            // Task ended without a final state, e.g. the runtime shut down
            Err(_) => Some(ScriptState::Stopped),
        }
    }

    /// Forget finished scripts
    pub fn reap(&mut self) {
        self.scripts.retain(|name, handle| {
            let done = handle.current().is_terminal() || handle.task.is_finished();
            if done {
                debug!(target: "scripting", "Reaping script {}", name);
            }
            !done
        });
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        let live = self.running();
        if !live.is_empty() {
            info!(target: "scripting", "Stopping {} script(s) on shutdown", live.len());
        }
        self.stop_all();
    }
}
