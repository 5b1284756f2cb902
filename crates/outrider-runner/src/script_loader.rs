use std::path::{Path, PathBuf};

use outrider_client::config::ScriptingConfig;
use outrider_scripting_host::{compile, CompileError, Program};

#[derive(Debug, thiserror::Error)]
pub enum ScriptLoadError {
    #[error("scripting is disabled in the configuration")]
    Disabled,
    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{name}: {source}")]
    Compile {
        name: String,
        #[source]
        source: CompileError,
    },
}

/// A compiled script ready to hand to the engine
#[derive(Debug)]
pub struct LoadedScript {
    /// Engine name: the file stem, e.g. `hunt` for `scripts/hunt.cmd`
    pub name: String,
    pub path: PathBuf,
    pub program: Program,
}

/// Find, read and compile a script by name or path
pub async fn load_script(
    config: &ScriptingConfig,
    name: &str,
) -> Result<LoadedScript, ScriptLoadError> {
    if !config.enabled {
        return Err(ScriptLoadError::Disabled);
    }

    let path = config.resolve_script(name);
    let source = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ScriptLoadError::Read {
            path: path.clone(),
            source,
        })?;

    let name = script_name(&path, name);
    let program = compile(&source).map_err(|source| ScriptLoadError::Compile {
        name: name.clone(),
        source,
    })?;

    tracing::debug!(
        target: "scripting",
        "Loaded {} from {} ({} instructions, {} highlights)",
        name,
        path.display(),
        program.len(),
        program.highlights().len()
    );

    Ok(LoadedScript {
        name,
        path,
        program,
    })
}

fn script_name(path: &Path, fallback: &str) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}
