/// Where an outgoing command came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOrigin {
    pub script: String,
    pub line: usize,
}

/// Actions sent to the connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send one line of text to the server
    SendCommand {
        command: String,
        /// Set when a script issued the command, `None` for user input
        origin: Option<CommandOrigin>,
    },
    /// Close the connection
    Disconnect,
}
