/// Script language front end and execution engine
///
/// Source text is compiled into a [`Program`] by [`compile`]; the
/// [`ScriptEngine`] runs programs against the live game stream, sending
/// commands through a [`outrider_client::SendCommand`] and reading and
/// writing the shared [`outrider_client::GlobalVariables`].
pub mod compiler;
pub mod engine;
pub mod error;
pub mod interpolation;

pub use compiler::{compile, CompileError, Highlight, Instruction, Op, Program, Target, TokenKind};
pub use engine::{Matcher, ScriptEngine, ScriptState};
pub use error::RuntimeError;
pub use interpolation::interpolate;
