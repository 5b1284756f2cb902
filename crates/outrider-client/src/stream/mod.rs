mod game_stream;
mod subject;

pub use game_stream::GameStream;
pub use subject::{Signal, Subject, Subscription};
