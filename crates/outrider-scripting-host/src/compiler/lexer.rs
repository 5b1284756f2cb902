use std::fmt;

/// Leading token of a script line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Script,
    Alias,
    Put,
    Echo,
    Pound,
    Goto,
    Equals,
    Var,
    Highlight,
    SetVariable,
    Pause,
    WaitFor,
    Colon,
}

impl TokenKind {
    /// Keyword lookup, case-insensitive. `#` and `:` lines are not keywords.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let kind = match word.to_ascii_uppercase().as_str() {
            "SCRIPT" => TokenKind::Script,
            "ALIAS" => TokenKind::Alias,
            "PUT" => TokenKind::Put,
            "ECHO" => TokenKind::Echo,
            "GOTO" => TokenKind::Goto,
            "EQUALS" => TokenKind::Equals,
            "VAR" => TokenKind::Var,
            "HIGHLIGHT" => TokenKind::Highlight,
            "SETVARIABLE" => TokenKind::SetVariable,
            "PAUSE" => TokenKind::Pause,
            "WAITFOR" => TokenKind::WaitFor,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Script => "SCRIPT",
            TokenKind::Alias => "ALIAS",
            TokenKind::Put => "PUT",
            TokenKind::Echo => "ECHO",
            TokenKind::Pound => "#",
            TokenKind::Goto => "GOTO",
            TokenKind::Equals => "EQUALS",
            TokenKind::Var => "VAR",
            TokenKind::Highlight => "HIGHLIGHT",
            TokenKind::SetVariable => "SETVARIABLE",
            TokenKind::Pause => "PAUSE",
            TokenKind::WaitFor => "WAITFOR",
            TokenKind::Colon => ":",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One non-blank source line split into its leading token and the rest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Text after the token, trimmed
    pub rest: &'a str,
}

/// Split a line. `Ok(None)` for blank lines, `Err` with the offending word
/// when the line starts with something that is not a keyword.
pub fn lex_line(line: &str) -> Result<Option<Token<'_>>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let Some(rest) = trimmed.strip_prefix('#') {
        return Ok(Some(Token {
            kind: TokenKind::Pound,
            rest: rest.trim(),
        }));
    }
    if let Some(rest) = trimmed.strip_prefix(':') {
        return Ok(Some(Token {
            kind: TokenKind::Colon,
            rest: rest.trim(),
        }));
    }

    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (trimmed, ""),
    };

    match TokenKind::from_keyword(word) {
        Some(kind) => Ok(Some(Token { kind, rest })),
        None => Err(word.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_case_insensitive() {
        for word in ["put", "PUT", "Put", "pUt"] {
            assert_eq!(TokenKind::from_keyword(word), Some(TokenKind::Put));
        }
        assert_eq!(TokenKind::from_keyword("setVariable"), Some(TokenKind::SetVariable));
        assert_eq!(TokenKind::from_keyword("putt"), None);
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(lex_line("   \t"), Ok(None));
    }

    #[test]
    fn test_comment_and_label() {
        assert_eq!(
            lex_line("# hunt loop"),
            Ok(Some(Token {
                kind: TokenKind::Pound,
                rest: "hunt loop"
            }))
        );
        assert_eq!(
            lex_line("  :start"),
            Ok(Some(Token {
                kind: TokenKind::Colon,
                rest: "start"
            }))
        );
    }

    #[test]
    fn test_rest_is_trimmed() {
        assert_eq!(
            lex_line("PUT   go  north  "),
            Ok(Some(Token {
                kind: TokenKind::Put,
                rest: "go  north"
            }))
        );
        assert_eq!(
            lex_line("pause"),
            Ok(Some(Token {
                kind: TokenKind::Pause,
                rest: ""
            }))
        );
    }

    #[test]
    fn test_unknown_word() {
        assert_eq!(lex_line("JUMP start"), Err("JUMP".to_string()));
    }
}
