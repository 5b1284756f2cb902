//! One connection from start to finish
//!
//! A [`Session`] wires the socket through the decoder onto a [`GameStream`],
//! runs scripts against it and hands the transcript to its consumers.

use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;

use outrider_client::config::{ScriptingConfig, ServerConfig};
use outrider_client::connection::{pump_stream, resolve, write_commands};
use outrider_client::{
    CommandSender, GameStream, GlobalVariables, SendCommand, Signal, StreamDecoder, Subscription,
    TransportError,
};
use outrider_events::{ConnectionStatus, LogLine, ScriptEventKind, StreamEvent};
use outrider_scripting_host::ScriptEngine;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::console::{ConsoleCommand, ScriptAction};
use crate::event_consumer::{EventConsumer, SessionEvent};
use crate::script_loader::load_script;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A script to start once the connection is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLaunch {
    /// Name or path, resolved with [`ScriptingConfig::resolve_script`]
    pub name: String,
    pub args: Vec<String>,
}

impl ScriptLaunch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Builder for [`Session`]
#[derive(Default)]
pub struct SessionBuilder {
    scripting: ScriptingConfig,
    scripts: Vec<ScriptLaunch>,
    consumers: Vec<Box<dyn EventConsumer>>,
    input: Option<mpsc::UnboundedReceiver<ConsoleCommand>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scripting(mut self, config: ScriptingConfig) -> Self {
        self.scripting = config;
        self
    }

    pub fn with_script(mut self, launch: ScriptLaunch) -> Self {
        self.scripts.push(launch);
        self
    }

    pub fn with_consumer(mut self, consumer: impl EventConsumer) -> Self {
        self.consumers.push(Box::new(consumer));
        self
    }

    /// Console commands; closing the channel ends the session
    pub fn with_input(mut self, input: mpsc::UnboundedReceiver<ConsoleCommand>) -> Self {
        self.input = Some(input);
        self
    }

    /// Disconnect once the watched value turns true
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    pub fn build(self) -> Session {
        let stream = GameStream::new();
        // Subscribed before anything is published so no line is missed
        let log = stream.log.subscribe();
        Session {
            stream,
            globals: GlobalVariables::new(),
            log,
            scripting: self.scripting,
            scripts: self.scripts,
            consumers: self.consumers,
            input: self.input,
            shutdown_rx: self.shutdown_rx,
        }
    }
}

pub struct Session {
    stream: GameStream,
    globals: GlobalVariables,
    log: Subscription<LogLine>,
    scripting: ScriptingConfig,
    scripts: Vec<ScriptLaunch>,
    consumers: Vec<Box<dyn EventConsumer>>,
    input: Option<mpsc::UnboundedReceiver<ConsoleCommand>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The event bus, for front ends that subscribe to categories directly
    pub fn stream(&self) -> &GameStream {
        &self.stream
    }

    pub fn globals(&self) -> &GlobalVariables {
        &self.globals
    }

    /// Open a TCP connection to `server` and run until it closes
    pub async fn connect(self, server: &ServerConfig) -> Result<(), SessionError> {
        let address = server.to_string();
        self.stream.publish(StreamEvent::Connection(ConnectionStatus::Connecting {
            address: address.clone(),
        }));

        let socket = open_socket(server, &address).await;

        match socket {
            Ok(socket) => self.run(address, socket).await,
            Err(source) => {
                let mut session = self;
                session.drain_log();
                session.dispatch(SessionEvent::Ended {
                    reason: Some(source.to_string()),
                });
                Err(SessionError::Connect { address, source })
            }
        }
    }

    /// Run over an already open byte stream until either side closes it
    pub async fn run<S>(mut self, address: String, socket: S) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.stream
            .publish(StreamEvent::Connection(ConnectionStatus::Connected {
                address: address.clone(),
            }));
        info!(target: "net", "Connected to {}", address);

        let (reader, writer) = tokio::io::split(socket);
        let (sender, command_rx) = CommandSender::channel();

        let write_target = self.stream.clone();
        let writer_task =
            tokio::spawn(async move { write_commands(writer, command_rx, &write_target).await });

        let mut decoder = StreamDecoder::with_variables(self.globals.clone());
        let pump_target = self.stream.clone();
        let reader_task =
            tokio::spawn(async move { pump_stream(reader, &mut decoder, &pump_target).await });

        let commands: Arc<dyn SendCommand> = Arc::new(sender.clone());
        let (engine, mut script_events) = ScriptEngine::new(
            commands,
            self.stream.clone(),
            self.globals.clone(),
            self.scripting.clone(),
        );
        let mut driver = Driver {
            engine,
            sender,
            globals: self.globals.clone(),
            scripting: self.scripting.clone(),
            consumers: std::mem::take(&mut self.consumers),
        };

        for launch in std::mem::take(&mut self.scripts) {
            driver.start_script(&launch.name, &launch.args).await;
        }

        let mut input = self.input.take();
        let mut shutdown_rx = self.shutdown_rx.take();

        let end = loop {
            tokio::select! {
                signal = self.log.next() => match signal {
                    Some(Signal::Next(line)) => driver.dispatch(SessionEvent::Log(line)),
                    Some(Signal::Error(reason)) => break End::Remote(Some(reason)),
                    Some(Signal::Completed) | None => break End::Remote(None),
                },
                Some(event) = script_events.recv() => {
                    let finished = matches!(
                        event.kind,
                        ScriptEventKind::Completed { .. }
                            | ScriptEventKind::Stopped
                            | ScriptEventKind::Failed { .. }
                    );
                    driver.dispatch(SessionEvent::Script(event));
                    if finished {
                        driver.engine.reap();
                    }
                }
                command = next_command(&mut input) => {
                    let command = command.unwrap_or_else(|| {
                        debug!(target: "net", "Console input closed");
                        input = None;
                        ConsoleCommand::Quit
                    });
                    if driver.handle_command(command).await.is_break() {
                        break End::Local;
                    }
                }
                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!("Shutdown requested");
                    shutdown_rx = None;
                    if driver.handle_command(ConsoleCommand::Quit).await.is_break() {
                        break End::Local;
                    }
                }
            }
        };

        driver.engine.stop_all();
        let _ = driver.sender.disconnect();

        // After a local quit or a failed write nobody closes the read half for us
        if end == End::Local || !reader_task.is_finished() {
            reader_task.abort();
        }
        let read_result = match reader_task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => {
                warn!(target: "net", "Reader task failed: {}", e);
                Ok(())
            }
        };
        let write_result = match writer_task.await {
            Ok(Err(e)) if end == End::Local => {
                warn!(target: "net", "Writer task failed: {}", e);
                Ok(())
            }
            Ok(result) => result,
            Err(e) => {
                warn!(target: "net", "Writer task panicked: {}", e);
                Ok(())
            }
        };

        // Lines decoded before the loop ended still belong to the transcript
        while let Some(Signal::Next(line)) = self.log.try_next() {
            driver.dispatch(SessionEvent::Log(line));
        }
        while let Ok(event) = script_events.try_recv() {
            driver.dispatch(SessionEvent::Script(event));
        }

        let reason = match end {
            End::Remote(reason) => reason,
            End::Local => None,
        };
        match &reason {
            Some(reason) => warn!(target: "net", "Connection to {} lost: {}", address, reason),
            None => info!(target: "net", "Disconnected from {}", address),
        }
        driver.dispatch(SessionEvent::Ended { reason });

        read_result.and(write_result).map_err(SessionError::from)
    }

    /// Hand already published log lines to the consumers
    fn drain_log(&mut self) {
        while let Some(Signal::Next(line)) = self.log.try_next() {
            self.dispatch(SessionEvent::Log(line));
        }
    }

    fn dispatch(&mut self, event: SessionEvent) {
        dispatch(&mut self.consumers, event);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum End {
    /// The stream completed or failed
    Remote(Option<String>),
    /// Quit from the console or a shutdown signal
    Local,
}

async fn open_socket(server: &ServerConfig, address: &str) -> io::Result<TcpStream> {
    let addr = resolve(&server.host, server.port).await?;
    info!(target: "net", "Connecting to {} ({})", address, addr);
    TcpStream::connect(addr).await
}

fn dispatch(consumers: &mut [Box<dyn EventConsumer>], event: SessionEvent) {
    if let Some((last, rest)) = consumers.split_last_mut() {
        for consumer in rest {
            consumer.handle_event(event.clone());
        }
        last.handle_event(event);
    }
}

/// Runtime half of a session: everything the event loop acts on
struct Driver {
    engine: ScriptEngine,
    sender: CommandSender,
    globals: GlobalVariables,
    scripting: ScriptingConfig,
    consumers: Vec<Box<dyn EventConsumer>>,
}

impl Driver {
    fn dispatch(&mut self, event: SessionEvent) {
        dispatch(&mut self.consumers, event);
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.dispatch(SessionEvent::Notice(text.into()));
    }

    async fn start_script(&mut self, name: &str, args: &[String]) {
        match load_script(&self.scripting, name).await {
            Ok(loaded) => {
                info!(target: "scripting", "Starting {} from {}", loaded.name, loaded.path.display());
                self.engine.start(&loaded.name, loaded.program, args);
            }
            Err(e) => {
                warn!(target: "scripting", "Could not start {}: {}", name, e);
                self.notice(format!("Could not start script: {}", e));
            }
        }
    }

    async fn handle_command(&mut self, command: ConsoleCommand) -> ControlFlow<()> {
        match command {
            ConsoleCommand::Send(text) => {
                if let Err(e) = self.sender.send(&text) {
                    self.notice(format!("Could not send: {}", e));
                }
            }
            ConsoleCommand::Start { name, args } => self.start_script(&name, &args).await,
            ConsoleCommand::Script { action, name } => {
                let found = match action {
                    ScriptAction::Abort => self.engine.stop(&name),
                    ScriptAction::Pause => self.engine.pause(&name),
                    ScriptAction::Resume => self.engine.resume(&name),
                    ScriptAction::Vars => self.engine.vars(&name).is_some(),
                };
                if !found {
                    self.notice(format!("No running script named {}", name));
                }
            }
            ConsoleCommand::Scripts => {
                let running = self.engine.running();
                if running.is_empty() {
                    self.notice("No scripts running");
                } else {
                    self.notice(format!("Running scripts: {}", running.join(", ")));
                }
            }
            ConsoleCommand::SetVariable { name, value } => {
                debug!(target: "scripting", "Console set {} = {:?}", name, value);
                self.globals.set(name, value);
            }
            ConsoleCommand::Quit => {
                info!(target: "net", "Disconnecting");
                let _ = self.sender.disconnect();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

/// Next console command; pending forever without a console
async fn next_command(
    input: &mut Option<mpsc::UnboundedReceiver<ConsoleCommand>>,
) -> Option<ConsoleCommand> {
    match input {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Resolves when shutdown is signalled; pending forever otherwise
async fn shutdown_requested(shutdown_rx: &mut Option<watch::Receiver<bool>>) {
    match shutdown_rx {
        Some(rx) => {
            if rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}
