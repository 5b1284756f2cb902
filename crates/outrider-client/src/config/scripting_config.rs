use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::outrider_config::project_dirs;

/// How `WAITFOR` patterns are compared against log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Substring,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Whether scripts may be started at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Directory scripts are looked up in (default: <data dir>/scripts)
    #[serde(default)]
    pub script_dir: Option<PathBuf>,

    /// Duration of a bare `PAUSE`
    #[serde(default = "default_pause_secs")]
    pub default_pause_secs: f64,

    #[serde(default)]
    pub match_mode: MatchMode,
}

fn default_enabled() -> bool {
    true
}

fn default_pause_secs() -> f64 {
    1.0
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            script_dir: None,
            default_pause_secs: 1.0,
            match_mode: MatchMode::Substring,
        }
    }
}

impl ScriptingConfig {
    /// Reject values the engine could not act on
    pub fn validate(&self) -> Result<(), String> {
        if Duration::try_from_secs_f64(self.default_pause_secs).is_err() {
            return Err(format!(
                "scripting.default_pause_secs must be a non-negative number of seconds, got {}",
                self.default_pause_secs
            ));
        }
        Ok(())
    }

    /// Get the script directory path (use provided or default)
    pub fn script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|d| d.data_dir().join("scripts"))
                .unwrap_or_else(|| PathBuf::from(".scripts"))
        })
    }

    /// Resolve a script name the way the `.name` console command does:
    /// an existing path is used as is, otherwise `<script_dir>/<name>.cmd`
    pub fn resolve_script(&self, name: &str) -> PathBuf {
        let direct = PathBuf::from(name);
        if direct.exists() {
            return direct;
        }
        let dir = self.script_dir();
        if direct.extension().is_some() {
            dir.join(name)
        } else {
            dir.join(format!("{}.cmd", name))
        }
    }
}
