//! Shared types for kiln
//!
//! This crate provides the leaf types used across the kiln workspace:
//! normalized document identifiers, glob/regex patterns tested against
//! them, and the attribute value model that checksums and filters
//! operate on.

pub mod identifier;
pub mod pattern;
pub mod value;

pub use identifier::{Identifier, IdentifierStyle};
pub use pattern::{Pattern, PatternError, PatternSpec};
pub use value::{SharedValue, Value, ValueMap};
