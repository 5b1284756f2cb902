pub mod config;
pub mod connection;
pub mod decoder;
pub mod stream;
pub mod variables;

pub use connection::{CommandSender, SendCommand, TransportError};
pub use decoder::StreamDecoder;
pub use stream::{GameStream, Signal, Subject, Subscription};
pub use variables::GlobalVariables;
