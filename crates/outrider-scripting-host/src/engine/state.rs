use std::fmt;

/// Lifecycle of one running script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptState {
    Ready,
    Running,
    /// In a `PAUSE` or held by a pause request
    Paused,
    /// In a `WAITFOR`
    AwaitingEvent,
    Stopped,
    Completed,
}

impl ScriptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScriptState::Stopped | ScriptState::Completed)
    }
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptState::Ready => "ready",
            ScriptState::Running => "running",
            ScriptState::Paused => "paused",
            ScriptState::AwaitingEvent => "waiting",
            ScriptState::Stopped => "stopped",
            ScriptState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Requested mode, written by the engine and read by the script task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Run,
    Hold,
    Stop,
}
