use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use outrider_client::config::{ConfigLoadError, OutriderConfig};
use outrider_client::{GlobalVariables, StreamDecoder};
use outrider_events::StreamEvent;
use outrider_runner::logging::init_logging;
use outrider_runner::{ConsoleCommand, LoggingConsumer, ScriptLaunch, Session};
use outrider_scripting_host::compile;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enables debug mode (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a configured server
    Connect {
        /// Server name from the config file
        #[arg(short, long)]
        server: String,

        /// Script to start once connected (repeatable)
        #[arg(long = "script", value_name = "NAME")]
        scripts: Vec<String>,
    },
    /// Compile a script and report problems
    Check { file: PathBuf },
    /// Run a captured game stream through the decoder and print the events
    Decode {
        file: PathBuf,

        /// Also print the variables the stream set
        #[arg(long)]
        vars: bool,
    },
}

fn log_level(debug: u8) -> &'static str {
    match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

const EXAMPLE_CONFIG: &str = r#"# Outrider configuration
# Add the servers you play on below

[servers.local]
host = "localhost"
port = 4000

[scripting]
enabled = true
# script_dir = "/path/to/scripts"
default_pause_secs = 1.0
# "substring" or "regex"
match_mode = "substring"

[logging]
file = false
"#;

fn create_example_config(config_path: &Path) -> Result<()> {
    // Never overwrite an existing config file
    if config_path.exists() {
        bail!(
            "Config file already exists at {}. Please edit it manually or delete it to create a new one.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, EXAMPLE_CONFIG)?;

    eprintln!("Config file created at: {}", config_path.display());
    eprintln!("Please edit it with your server details, then run outrider again.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = log_level(cli.debug);

    match cli.command {
        Command::Connect { server, scripts } => {
            let config_path = cli.config.unwrap_or_else(OutriderConfig::config_path);
            let config = match OutriderConfig::load_from(&config_path) {
                Ok(config) => config,
                Err(ConfigLoadError::NotFound) => return create_example_config(&config_path),
                Err(err) => return Err(anyhow!("Failed to load config: {}", err)),
            };
            let _guard = init_logging("cli", config.logging.file, level)?;
            connect(config, &server, scripts).await
        }
        Command::Check { file } => {
            let _guard = init_logging("cli", false, level)?;
            check(&file)
        }
        Command::Decode { file, vars } => {
            let _guard = init_logging("cli", false, level)?;
            decode(&file, vars)
        }
    }
}

async fn connect(config: OutriderConfig, server_name: &str, scripts: Vec<String>) -> Result<()> {
    let server = config.server(server_name).ok_or_else(|| {
        let available = config.servers.keys().cloned().collect::<Vec<_>>().join(", ");
        anyhow!(
            "Server '{}' not found. Available servers: {}",
            server_name,
            available
        )
    })?;

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut builder = Session::builder()
        .with_scripting(config.scripting.clone())
        .with_consumer(LoggingConsumer::new())
        .with_input(input_rx)
        .with_shutdown(shutdown_rx);
    for script in scripts {
        builder = builder.with_script(ScriptLaunch::new(script));
    }

    tokio::spawn(forward_stdin(input_tx));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    info!("Connecting to {} ({})", server_name, server);
    builder.build().connect(server).await?;
    Ok(())
}

/// Read console lines until stdin closes
async fn forward_stdin(input_tx: mpsc::UnboundedSender<ConsoleCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match ConsoleCommand::parse(&line) {
                Ok(command) => {
                    if input_tx.send(command).is_err() {
                        return;
                    }
                }
                Err(e) => eprintln!("{}", e),
            },
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                return;
            }
        }
    }
}

fn check(file: &Path) -> Result<()> {
    let source =
        fs::read_to_string(file).with_context(|| format!("could not read {}", file.display()))?;
    let program = compile(&source).map_err(|e| anyhow!("{}: {}", file.display(), e))?;

    println!(
        "{}: ok, {} instructions",
        program.name().map(str::to_string).unwrap_or_else(|| file.display().to_string()),
        program.len()
    );
    for (label, index) in program.labels() {
        println!("  label {} -> {}", label, index);
    }
    for alias in program.aliases() {
        println!("  alias {} -> {} (line {})", alias.trigger, alias.expansion, alias.line);
    }
    for highlight in program.highlights() {
        match &highlight.color {
            Some(color) => println!("  highlight {} {}", color, highlight.pattern),
            None => println!("  highlight {}", highlight.pattern),
        }
    }
    Ok(())
}

fn decode(file: &Path, print_vars: bool) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("could not read {}", file.display()))?;

    let globals = GlobalVariables::new();
    let mut decoder = StreamDecoder::with_variables(globals.clone());
    let mut events = decoder.feed(&bytes);
    events.extend(decoder.finish());

    for event in &events {
        println!("{}", describe(event));
    }
    if print_vars {
        for (name, value) in globals.snapshot() {
            println!("${} = {}", name, value);
        }
    }
    Ok(())
}

fn describe(event: &StreamEvent) -> String {
    format!("{:<10} {}", event.category().as_str(), event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use outrider_events::LogLine;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_connect_with_scripts() {
        let cli = Cli::try_parse_from([
            "outrider", "-dd", "connect", "--server", "dr", "--script", "hunt", "--script", "loot",
        ])
        .unwrap();
        assert_eq!(log_level(cli.debug), "trace");
        match cli.command {
            Command::Connect { server, scripts } => {
                assert_eq!(server, "dr");
                assert_eq!(scripts, vec!["hunt", "loot"]);
            }
            _ => panic!("Expected connect"),
        }
    }

    #[test]
    fn test_connect_requires_server() {
        assert!(Cli::try_parse_from(["outrider", "connect"]).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config: OutriderConfig = toml::from_str(EXAMPLE_CONFIG).unwrap();
        assert!(config.server("local").is_some());
        assert!(config.scripting.enabled);
    }

    #[test]
    fn test_demo_script_compiles() {
        let program = compile(include_str!("../../../demos/hunt.cmd")).unwrap();
        assert_eq!(program.name(), Some("hunt"));
        assert_eq!(program.label("loot").map(|i| program.get(i).is_some()), Some(true));
        assert_eq!(program.highlights().len(), 1);
    }

    #[test]
    fn test_demo_capture_decodes() {
        let globals = GlobalVariables::new();
        let mut decoder = StreamDecoder::with_variables(globals.clone());
        let mut events = decoder.feed(include_bytes!("../../../demos/session.log"));
        events.extend(decoder.finish());
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Room(_))));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Thought(_))));
        assert_eq!(globals.get("roundtime").as_deref(), Some("2"));
    }

    #[test]
    fn test_describe_pads_category() {
        let line = describe(&StreamEvent::Log(LogLine::new("You wave.")));
        assert!(line.starts_with("log "));
        assert!(line.ends_with("You wave."));
    }
}
