//! Glob and regex matchers tested against identifiers.

use crate::identifier::Identifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Uncompiled pattern as it appears in configuration or rules files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSpec {
    Glob(String),
    Regex(String),
}

/// A compiled matcher over identifiers.
///
/// Globs use `*` within a path segment and `**` across segments;
/// regexes match anywhere in the identifier string unless anchored.
/// Matching is side-effect-free; the only failure mode is malformed
/// regex syntax at construction time.
#[derive(Debug, Clone)]
pub enum Pattern {
    Glob(String),
    Regex(regex::Regex),
}

impl Pattern {
    pub fn glob(spec: impl Into<String>) -> Self {
        Pattern::Glob(spec.into())
    }

    pub fn regex(spec: &str) -> Result<Self, PatternError> {
        let compiled = regex::Regex::new(spec).map_err(|source| PatternError::InvalidRegex {
            pattern: spec.to_string(),
            source,
        })?;
        Ok(Pattern::Regex(compiled))
    }

    pub fn from_spec(spec: &PatternSpec) -> Result<Self, PatternError> {
        match spec {
            PatternSpec::Glob(g) => Ok(Pattern::glob(g.clone())),
            PatternSpec::Regex(r) => Pattern::regex(r),
        }
    }

    pub fn matches(&self, identifier: &Identifier) -> bool {
        match self {
            Pattern::Glob(glob) => glob_match::glob_match(glob, identifier.as_str()),
            Pattern::Regex(re) => re.is_match(identifier.as_str()),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Glob(glob) => write!(f, "{glob}"),
            Pattern::Regex(re) => write!(f, "{}", re.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_single_segment() {
        let pat = Pattern::glob("/posts/*.md");
        assert!(pat.matches(&Identifier::full("/posts/hello.md")));
        assert!(!pat.matches(&Identifier::full("/posts/2024/hello.md")));
    }

    #[test]
    fn test_glob_recursive_wildcard() {
        let pat = Pattern::glob("/posts/**/*.md");
        assert!(pat.matches(&Identifier::full("/posts/2024/01/hello.md")));

        let all = Pattern::glob("/**");
        assert!(all.matches(&Identifier::full("/anything/at/all.txt")));
        assert!(all.matches(&Identifier::legacy("/about/")));
    }

    #[test]
    fn test_regex() {
        let pat = Pattern::regex(r"^/posts/\d{4}/").unwrap();
        assert!(pat.matches(&Identifier::full("/posts/2024/hello.md")));
        assert!(!pat.matches(&Identifier::full("/posts/hello.md")));
    }

    #[test]
    fn test_malformed_regex_fails_at_construction() {
        assert!(Pattern::regex("([unclosed").is_err());
    }

    #[test]
    fn test_from_spec() {
        let spec = PatternSpec::Glob("/about/".to_string());
        let pat = Pattern::from_spec(&spec).unwrap();
        assert!(pat.matches(&Identifier::legacy("/about/")));
    }
}
