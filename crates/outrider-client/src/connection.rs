use std::net::SocketAddr;

use outrider_events::{ClientAction, CommandOrigin};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::decoder::StreamDecoder;
use crate::stream::GameStream;

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The "send text" half of a connection
pub trait SendCommand: Send + Sync {
    fn send(&self, command: &str) -> Result<(), TransportError>;

    /// Send on behalf of a script. Senders that keep no origin just send.
    fn send_from(&self, command: &str, _origin: CommandOrigin) -> Result<(), TransportError> {
        self.send(command)
    }
}

/// Channel-backed sender feeding the connection's writer task
///
/// Clones share the channel. A clone made with [`CommandSender::with_origin`]
/// tags everything it sends with the script and line it came from.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<ClientAction>,
    origin: Option<CommandOrigin>,
}

impl CommandSender {
    pub fn new(tx: mpsc::UnboundedSender<ClientAction>) -> Self {
        Self { tx, origin: None }
    }

    /// Sender plus the receiving end to hand to [`write_commands`]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn with_origin(&self, origin: CommandOrigin) -> Self {
        Self {
            tx: self.tx.clone(),
            origin: Some(origin),
        }
    }

    pub fn disconnect(&self) -> Result<(), TransportError> {
        self.tx
            .send(ClientAction::Disconnect)
            .map_err(|_| TransportError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl CommandSender {
    fn queue(&self, command: &str, origin: Option<CommandOrigin>) -> Result<(), TransportError> {
        self.tx
            .send(ClientAction::SendCommand {
                command: command.to_string(),
                origin,
            })
            .map_err(|_| TransportError::Closed)
    }
}

impl SendCommand for CommandSender {
    fn send(&self, command: &str) -> Result<(), TransportError> {
        self.queue(command, self.origin.clone())
    }

    fn send_from(&self, command: &str, origin: CommandOrigin) -> Result<(), TransportError> {
        self.queue(command, Some(origin))
    }
}

/// Resolve `host:port`, preferring IPv4 but falling back to IPv6
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, std::io::Error> {
    let addr = format!("{}:{}", host, port);
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr).await?.collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Could not resolve address: {}", addr),
            )
        })
}

/// Drain `reader` through `decoder` onto the event bus
///
/// End of input completes every channel. A read error ends every channel
/// with that error and is returned.
pub async fn pump_stream<R>(
    mut reader: R,
    decoder: &mut StreamDecoder,
    stream: &GameStream,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                stream.publish_all(decoder.finish());
                info!(target: "net", "Server closed the connection");
                stream.complete();
                return Ok(());
            }
            Ok(n) => {
                debug!(target: "net", "Received {} bytes", n);
                stream.publish_all(decoder.feed(&buf[..n]));
            }
            Err(e) => {
                warn!(target: "net", "Read failed: {}", e);
                stream.error(e.to_string());
                return Err(e.into());
            }
        }
    }
}

/// Writer task: send each queued command as one `\n`-terminated line
///
/// Returns when a [`ClientAction::Disconnect`] arrives or every sender is
/// dropped. A failed write ends every channel of `stream` with that error,
/// so scripts waiting on the stream fail instead of hanging.
pub async fn write_commands<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<ClientAction>,
    stream: &GameStream,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(action) = rx.recv().await {
        match action {
            ClientAction::SendCommand { command, origin } => {
                match &origin {
                    Some(origin) => debug!(
                        target: "net",
                        "Sending {:?} from {}:{}", command, origin.script, origin.line
                    ),
                    None => debug!(target: "net", "Sending {:?}", command),
                }
                if let Err(e) = write_line(&mut writer, &command).await {
                    warn!(target: "net", "Write failed: {}", e);
                    stream.error(e.to_string());
                    return Err(e.into());
                }
            }
            ClientAction::Disconnect => {
                info!(target: "net", "Disconnect requested");
                // The peer may already be gone
                if let Err(e) = writer.shutdown().await {
                    debug!(target: "net", "Shutdown failed: {}", e);
                }
                break;
            }
        }
    }
    Ok(())
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
