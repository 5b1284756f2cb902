use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{
    logging_config::LoggingConfig, scripting_config::ScriptingConfig, server_config::ServerConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("IO error reading config: {0}")]
    Io(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "outrider")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutriderConfig {
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,

    #[serde(default)]
    pub scripting: ScriptingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OutriderConfig {
    pub fn config_path() -> PathBuf {
        project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigLoadError::Io(e.to_string()))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigLoadError::Parse(e.to_string()))?;
        config.scripting.validate().map_err(ConfigLoadError::Invalid)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchMode;

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = OutriderConfig::load_from(&dir.path().join("config.toml"));
        assert!(matches!(result, Err(ConfigLoadError::NotFound)));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[servers.prime\nhost = ").unwrap();
        assert!(matches!(
            OutriderConfig::load_from(&path),
            Err(ConfigLoadError::Parse(_))
        ));
    }

    #[test]
    fn test_out_of_range_pause_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        for value in ["-1.0", "nan", "1e20"] {
            fs::write(&path, format!("[scripting]\ndefault_pause_secs = {}\n", value)).unwrap();
            match OutriderConfig::load_from(&path) {
                Err(ConfigLoadError::Invalid(message)) => {
                    assert!(message.contains("default_pause_secs"), "{}", message)
                }
                other => panic!("{} should be rejected, got {:?}", value, other),
            }
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = OutriderConfig::default();
        config.servers.insert(
            "prime".to_string(),
            ServerConfig {
                host: "dr.simutronics.net".to_string(),
                port: 11024,
            },
        );
        config.scripting.match_mode = MatchMode::Regex;
        config.logging.file = true;

        config.save_to(&path).unwrap();
        let loaded = OutriderConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.server("prime").map(|s| s.to_string()),
            Some("dr.simutronics.net:11024".to_string())
        );
    }

    #[test]
    fn test_sections_default() {
        let config: OutriderConfig = toml::from_str(
            r#"
            [servers.test]
            host = "localhost"
            port = 4000
            "#,
        )
        .unwrap();
        assert!(config.scripting.enabled);
        assert_eq!(config.scripting.default_pause_secs, 1.0);
        assert!(!config.logging.file);
    }
}
