use outrider_client::config::MatchMode;
use regex::Regex;

use crate::error::RuntimeError;

/// Decides whether a log line satisfies a `WAITFOR`
#[derive(Debug, Clone)]
pub enum Matcher {
    Substring(String),
    Regex(Regex),
}

impl Matcher {
    pub fn new(pattern: &str, mode: MatchMode) -> Result<Self, RuntimeError> {
        match mode {
            MatchMode::Substring => Ok(Matcher::Substring(pattern.to_string())),
            MatchMode::Regex => Regex::new(pattern)
                .map(Matcher::Regex)
                .map_err(|e| RuntimeError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Substring(needle) => text.contains(needle.as_str()),
            Matcher::Regex(re) => re.is_match(text),
        }
    }
}
