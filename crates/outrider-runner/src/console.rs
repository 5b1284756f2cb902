//! Commands typed at the console
//!
//! `.name args…` starts a script, `#script <action> <name>` manages one,
//! `#var <name> <value>` writes a global variable and `#quit` ends the
//! session. Anything else is sent to the server as is.

use std::fmt;

/// What a `#script` command does to a running script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
    Abort,
    Pause,
    Resume,
    Vars,
}

impl fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScriptAction::Abort => "abort",
            ScriptAction::Pause => "pause",
            ScriptAction::Resume => "resume",
            ScriptAction::Vars => "vars",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Raw text for the server
    Send(String),
    Start { name: String, args: Vec<String> },
    Script { action: ScriptAction, name: String },
    /// List running scripts
    Scripts,
    SetVariable { name: String, value: String },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown script action '{0}' (expected abort, pause, resume or vars)")]
    UnknownAction(String),
}

const SCRIPT_USAGE: &str = "#script <abort|pause|resume|vars> <name> | #script list";
const VAR_USAGE: &str = "#var <name> <value>";

impl ConsoleCommand {
    pub fn parse(input: &str) -> Result<Self, ConsoleError> {
        let line = input.trim();

        if let Some(rest) = line.strip_prefix('.') {
            let mut words = split_args(rest).into_iter();
            if let Some(name) = words.next() {
                return Ok(ConsoleCommand::Start {
                    name,
                    args: words.collect(),
                });
            }
        }

        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        match head.to_ascii_lowercase().as_str() {
            "#script" => parse_script(rest),
            "#var" => {
                let Some((name, value)) = rest.split_once(char::is_whitespace) else {
                    return Err(ConsoleError::Usage(VAR_USAGE));
                };
                Ok(ConsoleCommand::SetVariable {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                })
            }
            "#quit" => Ok(ConsoleCommand::Quit),
            _ => Ok(ConsoleCommand::Send(line.to_string())),
        }
    }
}

fn parse_script(rest: &str) -> Result<ConsoleCommand, ConsoleError> {
    let words: Vec<&str> = rest.split_whitespace().collect();
    match words.as_slice() {
        [list] if list.eq_ignore_ascii_case("list") => Ok(ConsoleCommand::Scripts),
        [action, name] => {
            let action = match action.to_ascii_lowercase().as_str() {
                "abort" | "stop" => ScriptAction::Abort,
                "pause" => ScriptAction::Pause,
                "resume" => ScriptAction::Resume,
                "vars" => ScriptAction::Vars,
                _ => return Err(ConsoleError::UnknownAction(action.to_string())),
            };
            Ok(ConsoleCommand::Script {
                action,
                name: name.to_string(),
            })
        }
        _ => Err(ConsoleError::Usage(SCRIPT_USAGE)),
    }
}

/// Split script arguments on whitespace; double quotes group words
pub fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent() {
        assert_eq!(
            ConsoleCommand::parse("  go north \n").unwrap(),
            ConsoleCommand::Send("go north".to_string())
        );
    }

    #[test]
    fn test_dot_starts_script_with_args() {
        assert_eq!(
            ConsoleCommand::parse(".hunt goblin \"large rat\"").unwrap(),
            ConsoleCommand::Start {
                name: "hunt".to_string(),
                args: vec!["goblin".to_string(), "large rat".to_string()],
            }
        );
    }

    #[test]
    fn test_lone_dot_is_sent() {
        assert_eq!(
            ConsoleCommand::parse(".").unwrap(),
            ConsoleCommand::Send(".".to_string())
        );
    }

    #[test]
    fn test_script_actions() {
        assert_eq!(
            ConsoleCommand::parse("#script pause hunt").unwrap(),
            ConsoleCommand::Script {
                action: ScriptAction::Pause,
                name: "hunt".to_string()
            }
        );
        assert_eq!(
            ConsoleCommand::parse("#SCRIPT Abort hunt").unwrap(),
            ConsoleCommand::Script {
                action: ScriptAction::Abort,
                name: "hunt".to_string()
            }
        );
        assert_eq!(
            ConsoleCommand::parse("#script list").unwrap(),
            ConsoleCommand::Scripts
        );
    }

    #[test]
    fn test_script_usage_errors() {
        assert_eq!(
            ConsoleCommand::parse("#script pause"),
            Err(ConsoleError::Usage(SCRIPT_USAGE))
        );
        assert_eq!(
            ConsoleCommand::parse("#script explode hunt"),
            Err(ConsoleError::UnknownAction("explode".to_string()))
        );
    }

    #[test]
    fn test_var_keeps_value_spacing() {
        assert_eq!(
            ConsoleCommand::parse("#var target a  large rat").unwrap(),
            ConsoleCommand::SetVariable {
                name: "target".to_string(),
                value: "a  large rat".to_string()
            }
        );
        assert!(ConsoleCommand::parse("#var target").is_err());
    }

    #[test]
    fn test_split_args_keeps_empty_quotes() {
        assert_eq!(split_args("a \"\" b"), vec!["a", "", "b"]);
        assert!(split_args("   ").is_empty());
    }
}
