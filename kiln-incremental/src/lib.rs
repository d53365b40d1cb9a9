//! Kiln incremental state
//!
//! This crate holds the persisted state that lets kiln regenerate only
//! what changed between runs:
//!
//! - a **dependency graph** of outdatedness-causing edges between
//!   documents, with memoized transitive closure and a cycle probe;
//! - a **structural checksummer** that fingerprints attribute values,
//!   document content, and recorded build plans;
//! - **versioned stores** that persist both to disk and recover from
//!   version mismatch or corruption by starting empty rather than
//!   failing the run.
//!
//! The decision procedure that combines these into "is this rep
//! outdated?" lives in `kiln-core`; this crate only answers "what
//! changed" and "what depends on what".

pub mod checksum;
pub mod checksum_store;
pub mod dependency_store;
pub mod entity;
pub mod graph;
pub mod store;

pub use checksum::{checksum, checksum_binary, checksum_parts, checksum_text, Digest};
pub use checksum_store::ChecksumStore;
pub use dependency_store::DependencyStore;
pub use entity::{Entity, Scope};
pub use graph::{DepGraph, DependencyProps};
pub use store::StoreError;
