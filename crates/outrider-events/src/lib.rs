/// Core event types for outrider
///
/// This crate holds the values that flow between the decoder, the event bus,
/// the scripting host and whatever UI sits on top, so none of those crates
/// need to depend on each other just to share a type.
pub mod client_actions;
pub mod script_events;
pub mod stream_events;

pub use client_actions::{ClientAction, CommandOrigin};
pub use script_events::{ScriptEvent, ScriptEventKind};
pub use stream_events::{
    Arrival, ConnectionStatus, Death, EventCategory, Experience, Familiar, LogLine, Room,
    StreamEvent, StyleHint, Thought, Vitals,
};
