/// Errors that stop a running script
///
/// Only the offending script stops; other scripts keep running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("line {line}: unknown label '{label}'")]
    UnknownLabel { line: usize, label: String },
    #[error("malformed variable reference in '{text}'")]
    MalformedVariable { text: String },
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("line {line}: cannot pause for {seconds} seconds")]
    InvalidPause { line: usize, seconds: String },
    #[error("send failed: {0}")]
    Transport(String),
    #[error("game stream ended: {0}")]
    StreamEnded(String),
}
