use std::collections::BTreeMap;
use std::fmt;

/// Category of a decoded stream event. Each category has its own channel on
/// the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Connection,
    Vitals,
    Room,
    Experience,
    Thought,
    Arrival,
    Death,
    Familiar,
    Log,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Connection => "connection",
            EventCategory::Vitals => "vitals",
            EventCategory::Room => "room",
            EventCategory::Experience => "experience",
            EventCategory::Thought => "thought",
            EventCategory::Arrival => "arrival",
            EventCategory::Death => "death",
            EventCategory::Familiar => "familiar",
            EventCategory::Log => "log",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vital name to percentage, e.g. `health -> 95`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vitals {
    pub values: BTreeMap<String, u8>,
}

impl Vitals {
    pub fn get(&self, name: &str) -> Option<u8> {
        self.values.get(name).copied()
    }
}

impl fmt::Display for Vitals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .values
            .iter()
            .map(|(name, value)| format!("{} {}%", name, value))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Vitals: {}", parts)
    }
}

/// A fully described room, emitted once the compass arrives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Room {
    pub title: String,
    pub description: String,
    pub objects: String,
    pub players: String,
    pub exits: Vec<String>,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if !self.title.is_empty() {
            lines.push(format!("[{}]", self.title));
        }
        for part in [&self.description, &self.objects, &self.players] {
            if !part.is_empty() {
                lines.push(part.clone());
            }
        }
        if self.exits.is_empty() {
            lines.push("Obvious exits: none".to_string());
        } else {
            lines.push(format!("Obvious exits: {}", self.exits.join(", ")));
        }
        f.write_str(&lines.join("\n"))
    }
}

/// One skill line from the experience window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experience {
    pub skill: String,
    /// Rank and percentage, e.g. `"5 30%"`
    pub ranks: Option<String>,
    /// Learning state, e.g. `"clear"` or `"dabbling"`
    pub mindstate: Option<String>,
    pub text: String,
}

impl fmt::Display for Experience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thought {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Death {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Familiar {
    pub text: String,
}

macro_rules! display_text {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.text)
                }
            }
        )*
    };
}

display_text!(Thought, Arrival, Death, Familiar);

/// Connection lifecycle, published by the session runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting { address: String },
    Connected { address: String },
    Disconnected { reason: Option<String> },
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting { address } => write!(f, "Connecting to {}", address),
            ConnectionStatus::Connected { address } => write!(f, "Connected to {}", address),
            ConnectionStatus::Disconnected { reason: None } => f.write_str("Disconnected"),
            ConnectionStatus::Disconnected {
                reason: Some(reason),
            } => write!(f, "Disconnected: {}", reason),
        }
    }
}

/// Rendering hints carried on a log line. The UI decides what they look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleHint {
    Bold,
    Mono,
    Prompt,
    /// Server preset id, e.g. `roomDesc` or `speech`
    Preset(String),
    /// Text arrived inside a pushed stream that has no dedicated category
    Stream(String),
    /// Text recovered from a malformed fragment
    Anomaly,
}

/// One transcript line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub styles: Vec<StyleHint>,
}

impl LogLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            styles: Vec::new(),
        }
    }

    pub fn with_style(mut self, style: StyleHint) -> Self {
        if !self.styles.contains(&style) {
            self.styles.push(style);
        }
        self
    }

    pub fn has_style(&self, style: &StyleHint) -> bool {
        self.styles.contains(style)
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A decoded, categorised piece of the server stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Connection(ConnectionStatus),
    Vitals(Vitals),
    Room(Room),
    Experience(Experience),
    Thought(Thought),
    Arrival(Arrival),
    Death(Death),
    Familiar(Familiar),
    Log(LogLine),
}

impl StreamEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            StreamEvent::Connection(_) => EventCategory::Connection,
            StreamEvent::Vitals(_) => EventCategory::Vitals,
            StreamEvent::Room(_) => EventCategory::Room,
            StreamEvent::Experience(_) => EventCategory::Experience,
            StreamEvent::Thought(_) => EventCategory::Thought,
            StreamEvent::Arrival(_) => EventCategory::Arrival,
            StreamEvent::Death(_) => EventCategory::Death,
            StreamEvent::Familiar(_) => EventCategory::Familiar,
            StreamEvent::Log(_) => EventCategory::Log,
        }
    }

    /// Transcript form of this event, as mirrored into the log channel
    pub fn to_log_line(&self) -> LogLine {
        match self {
            StreamEvent::Log(line) => line.clone(),
            other => LogLine::new(other.to_string())
                .with_style(StyleHint::Stream(other.category().as_str().to_string())),
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEvent::Connection(e) => e.fmt(f),
            StreamEvent::Vitals(e) => e.fmt(f),
            StreamEvent::Room(e) => e.fmt(f),
            StreamEvent::Experience(e) => e.fmt(f),
            StreamEvent::Thought(e) => e.fmt(f),
            StreamEvent::Arrival(e) => e.fmt(f),
            StreamEvent::Death(e) => e.fmt(f),
            StreamEvent::Familiar(e) => e.fmt(f),
            StreamEvent::Log(e) => e.fmt(f),
        }
    }
}
