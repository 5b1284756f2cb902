pub mod logging_config;
pub mod outrider_config;
pub mod scripting_config;
pub mod server_config;

pub use logging_config::LoggingConfig;
pub use outrider_config::{project_dirs, ConfigLoadError, OutriderConfig};
pub use scripting_config::{MatchMode, ScriptingConfig};
pub use server_config::ServerConfig;
