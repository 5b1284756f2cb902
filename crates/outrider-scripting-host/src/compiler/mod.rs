//! Script source to [`Program`]
//!
//! Compilation is line-oriented and all-or-nothing: the first problem found
//! is returned and no program is produced. Labels are collected in the
//! first pass and static jump targets checked in the second.

mod lexer;
mod program;

pub use lexer::{lex_line, Token, TokenKind};
pub use program::{Alias, Highlight, Instruction, Op, Program, Target};

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: label '{label}' is not defined")]
    DanglingLabel { line: usize, label: String },
    #[error("line {line}: label '{label}' is already defined")]
    DuplicateLabel { line: usize, label: String },
}

impl CompileError {
    pub fn line(&self) -> usize {
        match self {
            CompileError::Syntax { line, .. }
            | CompileError::DanglingLabel { line, .. }
            | CompileError::DuplicateLabel { line, .. } => *line,
        }
    }
}

/// Compile script source into a program
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let mut program = Program::default();

    // First pass: instructions, labels, aliases
    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let token = lex_line(raw).map_err(|word| CompileError::Syntax {
            line,
            message: format!("Unknown command '{}'", word),
        })?;
        let Some(token) = token else {
            continue;
        };

        if let Some(op) = parse_token(&token, line, &mut program)? {
            program.instructions.push(Instruction { line, op });
        }
    }

    // Second pass: every static jump must land on a known label
    for instruction in &mut program.instructions {
        let target = match &mut instruction.op {
            Op::Goto { target } | Op::Equals { target, .. } => target,
            _ => continue,
        };
        if let Target::Resolved { label, index } = target {
            match program.labels.get(label.as_str()) {
                Some(resolved) => *index = *resolved,
                None => {
                    return Err(CompileError::DanglingLabel {
                        line: instruction.line,
                        label: label.clone(),
                    })
                }
            }
        }
    }

    tracing::debug!(
        target: "scripting",
        "Compiled {} instruction(s), {} label(s), {} alias(es)",
        program.instructions.len(),
        program.labels.len(),
        program.aliases.len()
    );
    Ok(program)
}

fn syntax(line: usize, message: impl Into<String>) -> CompileError {
    CompileError::Syntax {
        line,
        message: message.into(),
    }
}

fn require<'a>(
    rest: &'a str,
    line: usize,
    kind: TokenKind,
    what: &str,
) -> Result<&'a str, CompileError> {
    if rest.is_empty() {
        Err(syntax(line, format!("{} requires {}", kind, what)))
    } else {
        Ok(rest)
    }
}

fn target(label: &str) -> Target {
    if label.contains('%') || label.contains('$') {
        Target::Dynamic(label.to_string())
    } else {
        // Index is filled in by the second pass
        Target::Resolved {
            label: label.to_string(),
            index: 0,
        }
    }
}

fn single_word<'a>(
    rest: &'a str,
    line: usize,
    kind: TokenKind,
    what: &str,
) -> Result<&'a str, CompileError> {
    let rest = require(rest, line, kind, what)?;
    if rest.split_whitespace().count() > 1 {
        return Err(syntax(line, format!("{} takes a single {}", kind, what)));
    }
    Ok(rest)
}

fn parse_token(
    token: &Token<'_>,
    line: usize,
    program: &mut Program,
) -> Result<Option<Op>, CompileError> {
    let rest = token.rest;
    let kind = token.kind;

    let op = match kind {
        TokenKind::Pound => Op::Pound {
            comment: rest.to_string(),
        },
        TokenKind::Colon => {
            let name = single_word(rest, line, kind, "a label name")?;
            // The label marker stays in the program; jumps land just after it
            let index = program.instructions.len() + 1;
            if program.labels.insert(name.to_string(), index).is_some() {
                return Err(CompileError::DuplicateLabel {
                    line,
                    label: name.to_string(),
                });
            }
            Op::Label {
                name: name.to_string(),
            }
        }
        TokenKind::Script => {
            let name = require(rest, line, kind, "a name")?;
            program.name = Some(name.to_string());
            Op::Script {
                name: name.to_string(),
            }
        }
        TokenKind::Alias => {
            let rest = require(rest, line, kind, "a trigger and an expansion")?;
            let Some((trigger, expansion)) = rest.split_once(char::is_whitespace) else {
                return Err(syntax(line, "ALIAS requires a trigger and an expansion"));
            };
            program.aliases.push(Alias {
                trigger: trigger.to_string(),
                expansion: expansion.trim().to_string(),
                line,
            });
            return Ok(None);
        }
        TokenKind::Put => Op::Put {
            text: require(rest, line, kind, "text to send")?.to_string(),
        },
        TokenKind::Echo => Op::Echo {
            text: rest.to_string(),
        },
        TokenKind::Goto => Op::Goto {
            target: target(single_word(rest, line, kind, "a label")?),
        },
        TokenKind::Equals => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            let [lhs, rhs, label] = args.as_slice() else {
                return Err(syntax(line, "EQUALS requires a value, a value and a label"));
            };
            Op::Equals {
                lhs: lhs.to_string(),
                rhs: rhs.to_string(),
                target: target(label),
            }
        }
        TokenKind::Var => Op::Var {
            name: single_word(rest, line, kind, "a variable name")?.to_string(),
        },
        TokenKind::SetVariable => {
            let rest = require(rest, line, kind, "a name")?;
            let (name, value) = match rest.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value.trim()),
                None => (rest, ""),
            };
            Op::SetVariable {
                name: name.to_string(),
                value: value.to_string(),
            }
        }
        TokenKind::Pause => {
            let seconds = if rest.is_empty() {
                None
            } else {
                match rest.parse::<f64>() {
                    Ok(secs) if Duration::try_from_secs_f64(secs).is_ok() => Some(secs),
                    _ => {
                        return Err(syntax(
                            line,
                            format!("PAUSE expects seconds, got '{}'", rest),
                        ))
                    }
                }
            };
            Op::Pause { seconds }
        }
        TokenKind::WaitFor => Op::WaitFor {
            pattern: require(rest, line, kind, "a pattern")?.to_string(),
        },
        TokenKind::Highlight => {
            let rest = require(rest, line, kind, "a pattern")?;
            let (color, pattern) = match rest.split_once(char::is_whitespace) {
                Some((first, pattern)) if is_color(first) => {
                    (Some(first.to_string()), pattern.trim())
                }
                _ if is_color(rest) => {
                    return Err(syntax(line, "HIGHLIGHT requires a pattern after the color"));
                }
                _ => (None, rest),
            };
            Op::Highlight(Highlight {
                color,
                pattern: pattern.to_string(),
            })
        }
    };

    Ok(Some(op))
}

fn is_color(word: &str) -> bool {
    word.len() == 7
        && word.starts_with('#')
        && word[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(program: &Program) -> Vec<TokenKind> {
        program.instructions().iter().map(|i| i.op.kind()).collect()
    }

    #[test]
    fn test_alias_scenario_shape() {
        let program = compile("ALIAS g go\n:start\nPUT %g north\nPAUSE 1\nGOTO start").unwrap();
        assert_eq!(
            kinds(&program),
            vec![TokenKind::Colon, TokenKind::Put, TokenKind::Pause, TokenKind::Goto]
        );
        assert_eq!(program.label("start"), Some(1));
        assert_eq!(program.get(1).map(|i| i.op.kind()), Some(TokenKind::Put));
        assert_eq!(
            program.get(3).map(|i| &i.op),
            Some(&Op::Goto {
                target: Target::Resolved {
                    label: "start".to_string(),
                    index: 1
                }
            })
        );
        assert_eq!(program.aliases().len(), 1);
    }

    #[test]
    fn test_lines_are_one_based_and_skip_blanks() {
        let program = compile("\n# loop\n\nPUT look\n").unwrap();
        let lines: Vec<usize> = program.instructions().iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![2, 4]);
    }

    #[test]
    fn test_script_sets_name() {
        let program = compile("script hunter\nput look").unwrap();
        assert_eq!(program.name(), Some("hunter"));
        assert_eq!(kinds(&program), vec![TokenKind::Script, TokenKind::Put]);
    }

    #[test]
    fn test_unknown_command() {
        let err = compile("PUT look\nJUMP start").unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                line: 2,
                message: "Unknown command 'JUMP'".to_string()
            }
        );
    }

    #[test]
    fn test_dangling_label() {
        let err = compile(":start\nGOTO finish").unwrap_err();
        assert_eq!(
            err,
            CompileError::DanglingLabel {
                line: 2,
                label: "finish".to_string()
            }
        );
    }

    #[test]
    fn test_dangling_label_in_equals() {
        let err = compile("EQUALS %a 1 nowhere").unwrap_err();
        assert!(matches!(err, CompileError::DanglingLabel { line: 1, .. }));
    }

    #[test]
    fn test_duplicate_label() {
        let err = compile(":a\nPUT look\n:a").unwrap_err();
        assert_eq!(
            err,
            CompileError::DuplicateLabel {
                line: 3,
                label: "a".to_string()
            }
        );
    }

    #[test]
    fn test_forward_label_resolves() {
        let program = compile("GOTO end\nPUT skipped\n:end").unwrap();
        assert_eq!(program.label("end"), Some(3));
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_dynamic_goto_is_not_checked() {
        let program = compile("GOTO %next").unwrap();
        assert_eq!(
            program.get(0).map(|i| &i.op),
            Some(&Op::Goto {
                target: Target::Dynamic("%next".to_string())
            })
        );
    }

    #[test]
    fn test_missing_arguments() {
        for source in ["PUT", "GOTO", "VAR", "WAITFOR", "ALIAS g", "EQUALS a b", ":", "HIGHLIGHT"] {
            assert!(
                matches!(compile(source), Err(CompileError::Syntax { line: 1, .. })),
                "{:?} should not compile",
                source
            );
        }
    }

    #[test]
    fn test_pause_arguments() {
        let program = compile("PAUSE\nPAUSE 0.5").unwrap();
        assert_eq!(program.get(0).map(|i| &i.op), Some(&Op::Pause { seconds: None }));
        assert_eq!(program.get(1).map(|i| &i.op), Some(&Op::Pause { seconds: Some(0.5) }));

        assert!(compile("PAUSE soon").is_err());
        assert!(compile("PAUSE -1").is_err());
        for source in ["PUT look\nPAUSE 1e20", "PUT look\nPAUSE inf", "PUT look\nPAUSE NaN"] {
            assert!(
                matches!(compile(source), Err(CompileError::Syntax { line: 2, .. })),
                "{:?} should not compile",
                source
            );
        }
    }

    #[test]
    fn test_setvariable_keeps_value_spacing() {
        let program = compile("SETVARIABLE target  a  large goblin").unwrap();
        assert_eq!(
            program.get(0).map(|i| &i.op),
            Some(&Op::SetVariable {
                name: "target".to_string(),
                value: "a  large goblin".to_string()
            })
        );
    }

    #[test]
    fn test_highlights() {
        let program = compile("HIGHLIGHT #ff0000 goblin\nHIGHLIGHT You are stunned").unwrap();
        assert_eq!(
            program.highlights(),
            vec![
                &Highlight {
                    color: Some("#ff0000".to_string()),
                    pattern: "goblin".to_string()
                },
                &Highlight {
                    color: None,
                    pattern: "You are stunned".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let source = "SCRIPT loop\nALIAS k kill\n:top\nVAR target\nEQUALS %target none done\nPUT k %target\nWAITFOR falls dead\nGOTO top\n:done\nECHO finished";
        assert_eq!(compile(source).unwrap(), compile(source).unwrap());
    }
}
