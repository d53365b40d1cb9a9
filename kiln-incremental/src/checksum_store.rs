//! Persisted digests from the previous run.
//!
//! Keyed by (entity, scope) for document content and attributes, plus
//! per-rep build-plan digests and the site-level configuration and code
//! digests. Compared against freshly computed digests on every run.

use crate::checksum::Digest;
use crate::entity::{Entity, Scope};
use crate::store::{self, StoreError};
use kiln_types::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChecksumData {
    documents: Vec<(Entity, Scope, Digest)>,
    rules: Vec<(Identifier, String, Digest)>,
}

#[derive(Debug, Default)]
pub struct ChecksumStore {
    documents: HashMap<(Entity, Scope), Digest>,
    rules: HashMap<(Identifier, String), Digest>,
    path: Option<PathBuf>,
}

impl ChecksumStore {
    /// In-memory store with no backing file.
    pub fn new() -> Self {
        ChecksumStore::default()
    }

    /// Load from disk; an unreadable or incompatible file yields an
    /// empty store, biasing every document toward "modified".
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data: ChecksumData = store::load(&path, STORE_VERSION);
        tracing::debug!(
            "Loaded checksum store from {} ({} document digests)",
            path.display(),
            data.documents.len()
        );
        ChecksumStore {
            documents: data
                .documents
                .into_iter()
                .map(|(entity, scope, digest)| ((entity, scope), digest))
                .collect(),
            rules: data
                .rules
                .into_iter()
                .map(|(id, rep, digest)| ((id, rep), digest))
                .collect(),
            path: Some(path),
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            let mut data = ChecksumData {
                documents: self
                    .documents
                    .iter()
                    .map(|((entity, scope), digest)| (entity.clone(), *scope, digest.clone()))
                    .collect(),
                rules: self
                    .rules
                    .iter()
                    .map(|((id, rep), digest)| (id.clone(), rep.clone(), digest.clone()))
                    .collect(),
            };
            // Deterministic file contents across runs.
            data.documents
                .sort_by(|a, b| format!("{}/{:?}", a.0, a.1).cmp(&format!("{}/{:?}", b.0, b.1)));
            data.rules.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
            store::save(path, STORE_VERSION, &data)?;
        }
        Ok(())
    }

    pub fn digest(&self, entity: &Entity, scope: Scope) -> Option<&Digest> {
        self.documents.get(&(entity.clone(), scope))
    }

    pub fn set_digest(&mut self, entity: Entity, scope: Scope, digest: Digest) {
        self.documents.insert((entity, scope), digest);
    }

    /// Stored fingerprint of how a rep was built last run.
    pub fn rule_digest(&self, identifier: &Identifier, rep_name: &str) -> Option<&Digest> {
        self.rules
            .get(&(identifier.clone(), rep_name.to_string()))
    }

    pub fn set_rule_digest(&mut self, identifier: Identifier, rep_name: String, digest: Digest) {
        self.rules.insert((identifier, rep_name), digest);
    }

    pub fn config_digest(&self) -> Option<&Digest> {
        self.digest(&Entity::Config, Scope::Attributes)
    }

    pub fn set_config_digest(&mut self, digest: Digest) {
        self.set_digest(Entity::Config, Scope::Attributes, digest);
    }

    pub fn code_digest(&self) -> Option<&Digest> {
        self.digest(&Entity::Code, Scope::Content)
    }

    pub fn set_code_digest(&mut self, digest: Digest) {
        self.set_digest(Entity::Code, Scope::Content, digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum_text;

    fn item(id: &str) -> Entity {
        Entity::Item(Identifier::full(id))
    }

    #[test]
    fn test_set_and_get() {
        let mut store = ChecksumStore::new();
        let digest = checksum_text("hello");
        store.set_digest(item("/a.md"), Scope::Content, digest.clone());

        assert_eq!(store.digest(&item("/a.md"), Scope::Content), Some(&digest));
        assert_eq!(store.digest(&item("/a.md"), Scope::Attributes), None);
    }

    #[test]
    fn test_rule_digests_are_per_rep() {
        let mut store = ChecksumStore::new();
        let id = Identifier::full("/a.md");
        store.set_rule_digest(id.clone(), "default".to_string(), checksum_text("plan-a"));
        store.set_rule_digest(id.clone(), "feed".to_string(), checksum_text("plan-b"));

        assert_ne!(
            store.rule_digest(&id, "default"),
            store.rule_digest(&id, "feed")
        );
        assert_eq!(store.rule_digest(&id, "missing"), None);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checksums.json");

        let mut store = ChecksumStore::load(&path);
        store.set_digest(item("/a.md"), Scope::Content, checksum_text("hello"));
        store.set_config_digest(checksum_text("config"));
        store.set_rule_digest(
            Identifier::full("/a.md"),
            "default".to_string(),
            checksum_text("plan"),
        );
        store.save().unwrap();

        let restored = ChecksumStore::load(&path);
        assert_eq!(
            restored.digest(&item("/a.md"), Scope::Content),
            Some(&checksum_text("hello"))
        );
        assert_eq!(restored.config_digest(), Some(&checksum_text("config")));
        assert_eq!(
            restored.rule_digest(&Identifier::full("/a.md"), "default"),
            Some(&checksum_text("plan"))
        );
    }

    #[test]
    fn test_corrupt_file_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checksums.json");
        std::fs::write(&path, b"not json at all").unwrap();

        let store = ChecksumStore::load(&path);
        assert_eq!(store.digest(&item("/a.md"), Scope::Content), None);
    }
}
