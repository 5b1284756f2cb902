use std::collections::BTreeMap;

use super::lexer::TokenKind;

/// Where a `GOTO` or `EQUALS` goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Label known at compile time
    Resolved { label: String, index: usize },
    /// Label text containing variables, looked up after interpolation
    Dynamic(String),
}

/// Display rule kept for the UI; it has no runtime effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    /// `#rrggbb`, if one was given
    pub color: Option<String>,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Script { name: String },
    Pound { comment: String },
    Label { name: String },
    Put { text: String },
    Echo { text: String },
    Goto { target: Target },
    Equals { lhs: String, rhs: String, target: Target },
    Var { name: String },
    SetVariable { name: String, value: String },
    Pause { seconds: Option<f64> },
    WaitFor { pattern: String },
    Highlight(Highlight),
}

impl Op {
    pub fn kind(&self) -> TokenKind {
        match self {
            Op::Script { .. } => TokenKind::Script,
            Op::Pound { .. } => TokenKind::Pound,
            Op::Label { .. } => TokenKind::Colon,
            Op::Put { .. } => TokenKind::Put,
            Op::Echo { .. } => TokenKind::Echo,
            Op::Goto { .. } => TokenKind::Goto,
            Op::Equals { .. } => TokenKind::Equals,
            Op::Var { .. } => TokenKind::Var,
            Op::SetVariable { .. } => TokenKind::SetVariable,
            Op::Pause { .. } => TokenKind::Pause,
            Op::WaitFor { .. } => TokenKind::WaitFor,
            Op::Highlight(_) => TokenKind::Highlight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// 1-based source line
    pub line: usize,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub trigger: String,
    pub expansion: String,
    /// Source line of the `ALIAS`; only `PUT`s below it see the alias
    pub line: usize,
}

/// A compiled script
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub(crate) name: Option<String>,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) labels: BTreeMap<String, usize>,
    pub(crate) aliases: Vec<Alias>,
}

impl Program {
    /// Name from the `SCRIPT` line, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Index of the instruction a label jumps to
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn labels(&self) -> &BTreeMap<String, usize> {
        &self.labels
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    pub fn highlights(&self) -> Vec<&Highlight> {
        self.instructions
            .iter()
            .filter_map(|i| match &i.op {
                Op::Highlight(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    /// Apply the aliases visible from `line` to an outgoing command
    ///
    /// The first word is compared with each trigger defined above `line`;
    /// the latest matching definition replaces it.
    pub fn expand_alias(&self, text: &str, line: usize) -> String {
        let (first, rest) = match text.split_once(char::is_whitespace) {
            Some((first, rest)) => (first, rest.trim_start()),
            None => (text, ""),
        };

        let alias = self
            .aliases
            .iter()
            .rev()
            .find(|a| a.line < line && a.trigger == first);

        match alias {
            Some(alias) if rest.is_empty() => alias.expansion.clone(),
            Some(alias) => format!("{} {}", alias.expansion, rest),
            None => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_with_aliases(aliases: &[(&str, &str, usize)]) -> Program {
        Program {
            aliases: aliases
                .iter()
                .map(|(t, e, l)| Alias {
                    trigger: t.to_string(),
                    expansion: e.to_string(),
                    line: *l,
                })
                .collect(),
            ..Program::default()
        }
    }

    #[test]
    fn test_alias_replaces_first_word() {
        let program = program_with_aliases(&[("k", "kill", 1)]);
        assert_eq!(program.expand_alias("k goblin", 2), "kill goblin");
        assert_eq!(program.expand_alias("k", 2), "kill");
        assert_eq!(program.expand_alias("kick goblin", 2), "kick goblin");
    }

    #[test]
    fn test_alias_not_visible_above_definition() {
        let program = program_with_aliases(&[("k", "kill", 5)]);
        assert_eq!(program.expand_alias("k goblin", 3), "k goblin");
    }

    #[test]
    fn test_latest_alias_wins() {
        let program = program_with_aliases(&[("k", "kill", 1), ("k", "kick", 4)]);
        assert_eq!(program.expand_alias("k goblin", 3), "kill goblin");
        assert_eq!(program.expand_alias("k goblin", 6), "kick goblin");
    }
}
