//! Document model: items, layouts, and compiled representations.

use crate::rules::ActionSequence;
use kiln_incremental::{checksum, checksum_binary, checksum_parts, checksum_text, Digest, Entity};
use kiln_types::{Identifier, Pattern, Value, ValueMap};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(Identifier),
}

/// Reference to file-backed binary content, fingerprinted by size and
/// modification time instead of full byte hashing.
#[derive(Debug, Clone)]
pub struct BinaryRef {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: SystemTime,
}

#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Binary(BinaryRef),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Content::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Binary(_) => None,
        }
    }

    pub fn digest(&self) -> Digest {
        match self {
            Content::Text(s) => checksum_text(s),
            Content::Binary(bin) => checksum_binary(bin.size, bin.mtime),
        }
    }
}

/// A source content unit: immutable content plus a string-keyed,
/// order-preserving attribute map.
#[derive(Debug, Clone)]
pub struct Document {
    pub identifier: Identifier,
    pub content: Content,
    pub attributes: ValueMap,
    pub mtime: Option<SystemTime>,
}

impl Document {
    pub fn new(identifier: Identifier, content: Content, attributes: ValueMap) -> Self {
        Document {
            identifier,
            content,
            attributes,
            mtime: None,
        }
    }

    pub fn content_digest(&self) -> Digest {
        self.content.digest()
    }

    pub fn attributes_digest(&self) -> Digest {
        checksum(&Value::Map(self.attributes.clone()))
    }

    /// Combined fingerprint: content, attributes, identifier.
    pub fn digest(&self) -> Digest {
        let content = self.content_digest();
        let attributes = self.attributes_digest();
        let identifier = checksum_text(self.identifier.as_str());
        checksum_parts(&[&content, &attributes, &identifier])
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub document: Document,
}

impl Item {
    pub fn new(document: Document) -> Self {
        Item { document }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.document.identifier
    }

    pub fn entity(&self) -> Entity {
        Entity::Item(self.document.identifier.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub document: Document,
}

impl Layout {
    pub fn new(document: Document) -> Self {
        Layout { document }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.document.identifier
    }

    pub fn entity(&self) -> Entity {
        Entity::Layout(self.document.identifier.clone())
    }
}

/// Key of one named compiled variant of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepKey {
    pub item: Identifier,
    pub name: String,
}

impl RepKey {
    pub fn new(item: Identifier, name: impl Into<String>) -> Self {
        RepKey {
            item,
            name: name.into(),
        }
    }
}

impl fmt::Display for RepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (rep {})", self.item, self.name)
    }
}

/// One named compiled variant of an item: its recorded build plan, the
/// snapshot contents captured during this run, and the output paths
/// declared for those snapshots. Lives for one compilation pass; only
/// its fingerprints survive across runs.
#[derive(Debug, Clone)]
pub struct Rep {
    pub key: RepKey,
    pub sequence: ActionSequence,
    pub snapshots: HashMap<String, Content>,
    /// (snapshot name, output path relative to the output dir)
    pub paths: Vec<(String, PathBuf)>,
    pub compiled: bool,
    pub force_outdated: bool,
}

impl Rep {
    pub fn new(key: RepKey, sequence: ActionSequence) -> Self {
        let paths = sequence.declared_paths();
        Rep {
            key,
            sequence,
            snapshots: HashMap::new(),
            paths,
            compiled: false,
            force_outdated: false,
        }
    }

    pub fn snapshot(&self, name: &str) -> Option<&Content> {
        self.snapshots.get(name)
    }

    /// First declared output path, if the rep routes anywhere.
    pub fn path(&self) -> Option<&PathBuf> {
        self.paths.first().map(|(_, path)| path)
    }

    /// Reset per-pass state ahead of a (re)compilation attempt.
    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.compiled = false;
    }
}

/// The loaded site: item and layout collections plus site code, owned
/// for the duration of a run and never mutated by the compiler.
#[derive(Debug, Default)]
pub struct Site {
    items: Vec<Item>,
    layouts: Vec<Layout>,
    item_index: HashMap<Identifier, usize>,
    layout_index: HashMap<Identifier, usize>,
    code_snippets: Vec<String>,
}

impl Site {
    pub fn new(
        items: Vec<Item>,
        layouts: Vec<Layout>,
        code_snippets: Vec<String>,
    ) -> Result<Self, SiteError> {
        let mut item_index = HashMap::new();
        for (i, item) in items.iter().enumerate() {
            if item_index
                .insert(item.identifier().clone(), i)
                .is_some()
            {
                return Err(SiteError::DuplicateIdentifier(item.identifier().clone()));
            }
        }
        let mut layout_index = HashMap::new();
        for (i, layout) in layouts.iter().enumerate() {
            if layout_index
                .insert(layout.identifier().clone(), i)
                .is_some()
            {
                return Err(SiteError::DuplicateIdentifier(layout.identifier().clone()));
            }
        }
        Ok(Site {
            items,
            layouts,
            item_index,
            layout_index,
            code_snippets,
        })
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    pub fn code_snippets(&self) -> &[String] {
        &self.code_snippets
    }

    pub fn item(&self, identifier: &Identifier) -> Option<&Item> {
        self.item_index.get(identifier).map(|&i| &self.items[i])
    }

    pub fn layout(&self, identifier: &Identifier) -> Option<&Layout> {
        self.layout_index.get(identifier).map(|&i| &self.layouts[i])
    }

    pub fn items_matching(&self, pattern: &Pattern) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|item| pattern.matches(item.identifier()))
            .collect()
    }

    /// First layout (in load order) whose identifier matches.
    pub fn layout_matching(&self, pattern: &Pattern) -> Option<&Layout> {
        self.layouts
            .iter()
            .find(|layout| pattern.matches(layout.identifier()))
    }

    /// Children of a legacy identifier: items exactly one segment
    /// below it.
    pub fn children_of(&self, identifier: &Identifier) -> Vec<&Item> {
        let prefix = identifier.as_str();
        self.items
            .iter()
            .filter(|item| {
                let id = item.identifier().as_str();
                if id == prefix || !id.starts_with(prefix) {
                    return false;
                }
                let rest = &id[prefix.len()..];
                !rest.trim_end_matches('/').contains('/')
            })
            .collect()
    }

    /// Fingerprint of all site code snippets, order-sensitive.
    pub fn code_digest(&self) -> Digest {
        let value = Value::List(
            self.code_snippets
                .iter()
                .map(|s| Value::String(s.clone()))
                .collect(),
        );
        checksum(&value)
    }
}
