//! Keys for persisted per-document state.

use kiln_types::Identifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A thing that can cause outdatedness: a document, the configuration,
/// the rule set, or site code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Entity {
    Item(Identifier),
    Layout(Identifier),
    Config,
    Rules,
    Code,
}

impl Entity {
    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            Entity::Item(id) | Entity::Layout(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Item(id) => write!(f, "item {id}"),
            Entity::Layout(id) => write!(f, "layout {id}"),
            Entity::Config => write!(f, "configuration"),
            Entity::Rules => write!(f, "rules"),
            Entity::Code => write!(f, "code"),
        }
    }
}

/// Which facet of an entity a checksum covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Content,
    Attributes,
}
