use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Notification from a running script, addressed to the UI
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEvent {
    /// Name the script was started under
    pub script: String,
    /// Source line the script was on, if any
    pub line: Option<usize>,
    pub kind: ScriptEventKind,
}

impl ScriptEvent {
    pub fn new(script: impl Into<String>, line: Option<usize>, kind: ScriptEventKind) -> Self {
        Self {
            script: script.into(),
            line,
            kind,
        }
    }
}

/// Types of script notifications
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEventKind {
    Started,
    Echo { text: String },
    Sent { command: String },
    Label { name: String },
    Paused { seconds: f64 },
    Waiting { pattern: String },
    Vars { variables: BTreeMap<String, String> },
    Completed { elapsed: Duration },
    Stopped,
    Failed { error: String },
}

impl fmt::Display for ScriptEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptEventKind::Started => f.write_str("started"),
            ScriptEventKind::Echo { text } => write!(f, "echo: {}", text),
            ScriptEventKind::Sent { command } => write!(f, "put: {}", command),
            ScriptEventKind::Label { name } => write!(f, "passing label: {}", name),
            ScriptEventKind::Paused { seconds } => write!(f, "pausing for {:.2} seconds", seconds),
            ScriptEventKind::Waiting { pattern } => write!(f, "waiting for: {}", pattern),
            ScriptEventKind::Vars { variables } => {
                let pairs = variables
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "vars: {}", pairs)
            }
            ScriptEventKind::Completed { elapsed } => write!(
                f,
                "completed - {:.2} seconds total run time",
                elapsed.as_secs_f64()
            ),
            ScriptEventKind::Stopped => f.write_str("stopped"),
            ScriptEventKind::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

impl fmt::Display for ScriptEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}:{}] {}", self.script, line, self.kind),
            None => write!(f, "[{}] {}", self.script, self.kind),
        }
    }
}
