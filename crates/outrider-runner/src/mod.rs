mod console;
mod event_consumer;
pub mod logging;
mod script_loader;
mod session;

pub use console::{split_args, ConsoleCommand, ConsoleError, ScriptAction};
pub use event_consumer::{ChannelConsumer, EventConsumer, LoggingConsumer, SessionEvent};
pub use script_loader::{load_script, LoadedScript, ScriptLoadError};
pub use session::{ScriptLaunch, Session, SessionBuilder, SessionError};
