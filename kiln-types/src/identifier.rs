//! Normalized path keys for documents.
//!
//! An identifier is a slash-delimited key like `/posts/hello.md`. Two
//! styles exist: *full* identifiers are exact strings, while *legacy*
//! identifiers follow the trailing-slash convention (`/posts/hello/`)
//! and additionally support deriving a parent key and joining child
//! segments. Equality and hashing go through the normalized string
//! form, never object identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Add;

/// Which identifier convention a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierStyle {
    /// Exact-string identity, e.g. `/posts/hello.md`.
    #[default]
    Full,
    /// Trailing-slash convention, e.g. `/posts/hello/`.
    Legacy,
}

/// A normalized slash-delimited document key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    repr: String,
    style: IdentifierStyle,
}

impl Identifier {
    /// Create a full-style identifier from a path-like string.
    pub fn full(raw: impl AsRef<str>) -> Self {
        Identifier {
            repr: normalize(raw.as_ref(), false),
            style: IdentifierStyle::Full,
        }
    }

    /// Create a legacy-style identifier; the trailing slash is enforced.
    pub fn legacy(raw: impl AsRef<str>) -> Self {
        Identifier {
            repr: normalize(raw.as_ref(), true),
            style: IdentifierStyle::Legacy,
        }
    }

    /// Create an identifier in the given style.
    pub fn with_style(raw: impl AsRef<str>, style: IdentifierStyle) -> Self {
        match style {
            IdentifierStyle::Full => Identifier::full(raw),
            IdentifierStyle::Legacy => Identifier::legacy(raw),
        }
    }

    pub fn style(&self) -> IdentifierStyle {
        self.style
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }

    pub fn is_root(&self) -> bool {
        self.repr == "/"
    }

    /// Path segments between slashes, empty segments elided.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.repr.split('/').filter(|s| !s.is_empty())
    }

    /// Parent key for legacy identifiers: strip the last segment.
    ///
    /// Returns `None` for the root and for full-style identifiers,
    /// which have no parent convention.
    pub fn parent(&self) -> Option<Identifier> {
        if self.style != IdentifierStyle::Legacy || self.is_root() {
            return None;
        }
        let trimmed = self.repr.trim_end_matches('/');
        let cut = trimmed.rfind('/')?;
        Some(Identifier::legacy(&trimmed[..=cut]))
    }

    /// Join a child segment onto a legacy identifier.
    pub fn join(&self, segment: &str) -> Identifier {
        let mut repr = self.repr.clone();
        if !repr.ends_with('/') {
            repr.push('/');
        }
        repr.push_str(segment.trim_start_matches('/'));
        Identifier::with_style(repr, self.style)
    }

    /// The extension of the last segment, if any.
    pub fn extension(&self) -> Option<&str> {
        let last = self.repr.trim_end_matches('/').rsplit('/').next()?;
        let dot = last.rfind('.')?;
        if dot == 0 {
            return None;
        }
        Some(&last[dot + 1..])
    }

    /// The identifier string with the last segment's extension removed.
    pub fn without_extension(&self) -> &str {
        match self.extension() {
            Some(ext) => &self.repr[..self.repr.len() - ext.len() - 1],
            None => &self.repr,
        }
    }
}

/// Collapse duplicate slashes and enforce the leading (and, for legacy
/// identifiers, trailing) slash.
fn normalize(raw: &str, trailing: bool) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('/');
    let mut prev_slash = true;
    for ch in raw.trim().chars() {
        if ch == '/' {
            if !prev_slash {
                out.push('/');
            }
            prev_slash = true;
        } else {
            out.push(ch);
            prev_slash = false;
        }
    }
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    if !trailing && out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

// Equality is by normalized string form; the style is metadata.
impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr.hash(state);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.repr.cmp(&other.repr)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl Add<&str> for &Identifier {
    type Output = Identifier;

    fn add(self, segment: &str) -> Identifier {
        self.join(segment)
    }
}
