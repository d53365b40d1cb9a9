//! Deciding whether a rep needs recompiling.
//!
//! Each rep is checked against the persisted digests from the previous
//! run. Missing state always reads as outdated; the engine recompiles
//! too much rather than too little. Reasons are reported in a fixed
//! order so diagnostics are stable across runs.

use crate::config::Config;
use crate::model::{Rep, RepKey, Site};
use kiln_incremental::{ChecksumStore, DependencyStore, Digest, Entity, Scope};
use kiln_types::Identifier;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutdatednessReason {
    NotWritten,
    ContentModified,
    AttributesModified,
    RulesModified,
    CodeSnippetsModified,
    ConfigurationModified,
    DependenciesOutdated,
}

impl fmt::Display for OutdatednessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            OutdatednessReason::NotWritten => "the output file has not been written yet",
            OutdatednessReason::ContentModified => "the content has been modified",
            OutdatednessReason::AttributesModified => "the attributes have been modified",
            OutdatednessReason::RulesModified => "the compilation rules have changed",
            OutdatednessReason::CodeSnippetsModified => "the site code has changed",
            OutdatednessReason::ConfigurationModified => "the configuration has changed",
            OutdatednessReason::DependenciesOutdated => "a dependency is outdated",
        };
        f.write_str(msg)
    }
}

pub struct OutdatednessChecker<'a> {
    checksums: &'a ChecksumStore,
    dependencies: &'a DependencyStore,
    site: &'a Site,
    reps: &'a HashMap<RepKey, Rep>,
    reps_by_item: HashMap<Identifier, Vec<RepKey>>,
    output_dir: PathBuf,
    config_digest: Digest,
    code_digest: Digest,
}

impl<'a> OutdatednessChecker<'a> {
    pub fn new(
        checksums: &'a ChecksumStore,
        dependencies: &'a DependencyStore,
        site: &'a Site,
        config: &Config,
        reps: &'a HashMap<RepKey, Rep>,
    ) -> Self {
        let mut reps_by_item: HashMap<Identifier, Vec<RepKey>> = HashMap::new();
        for key in reps.keys() {
            reps_by_item
                .entry(key.item.clone())
                .or_default()
                .push(key.clone());
        }
        OutdatednessChecker {
            checksums,
            dependencies,
            site,
            reps,
            reps_by_item,
            output_dir: config.output_dir(),
            config_digest: kiln_incremental::checksum(&config.to_value()),
            code_digest: site.code_digest(),
        }
    }

    /// All reasons this rep is outdated, in reporting order. An empty
    /// list from a rep with `force_outdated` set still recompiles.
    pub fn reasons_for(&self, rep: &Rep) -> Vec<OutdatednessReason> {
        let mut reasons = self.basic_reasons(rep);
        let mut memo = HashMap::new();
        let mut in_progress = HashSet::new();
        let entity = Entity::Item(rep.key.item.clone());
        in_progress.insert(entity.clone());
        let deps_outdated = self
            .dependencies
            .dependencies_of(&entity)
            .into_iter()
            .any(|dep| self.entity_outdated(&dep, &mut in_progress, &mut memo));
        if deps_outdated {
            reasons.push(OutdatednessReason::DependenciesOutdated);
        }
        reasons
    }

    pub fn is_outdated(&self, rep: &Rep) -> bool {
        rep.force_outdated || !self.reasons_for(rep).is_empty()
    }

    fn basic_reasons(&self, rep: &Rep) -> Vec<OutdatednessReason> {
        let mut reasons = Vec::new();
        if rep.paths.iter().any(|(_, path)| {
            match self.output_path(path) {
                Some(target) => !target.exists(),
                // Paths the writer will refuse count as never written.
                None => true,
            }
        }) {
            reasons.push(OutdatednessReason::NotWritten);
        }

        let entity = Entity::Item(rep.key.item.clone());
        match self.site.item(&rep.key.item) {
            Some(item) => {
                if self.checksums.digest(&entity, Scope::Content)
                    != Some(&item.document.content_digest())
                {
                    reasons.push(OutdatednessReason::ContentModified);
                }
                if self.checksums.digest(&entity, Scope::Attributes)
                    != Some(&item.document.attributes_digest())
                {
                    reasons.push(OutdatednessReason::AttributesModified);
                }
            }
            None => reasons.push(OutdatednessReason::ContentModified),
        }

        if self.checksums.rule_digest(&rep.key.item, &rep.key.name)
            != Some(&rep.sequence.digest())
        {
            reasons.push(OutdatednessReason::RulesModified);
        }
        if self.checksums.code_digest() != Some(&self.code_digest) {
            reasons.push(OutdatednessReason::CodeSnippetsModified);
        }
        if self.checksums.config_digest() != Some(&self.config_digest) {
            reasons.push(OutdatednessReason::ConfigurationModified);
        }
        reasons
    }

    fn output_path(&self, rel: &std::path::Path) -> Option<PathBuf> {
        let mut clean = PathBuf::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => return None,
            }
        }
        Some(self.output_dir.join(clean))
    }

    /// Transitive outdatedness with a cycle guard: an entity currently
    /// being evaluated reads as not outdated, so dependency cycles in
    /// the recorded graph terminate instead of recursing forever.
    fn entity_outdated(
        &self,
        entity: &Entity,
        in_progress: &mut HashSet<Entity>,
        memo: &mut HashMap<Entity, bool>,
    ) -> bool {
        if in_progress.contains(entity) {
            return false;
        }
        if let Some(&known) = memo.get(entity) {
            return known;
        }
        in_progress.insert(entity.clone());

        let mut outdated = self.entity_basic_outdated(entity);
        if !outdated {
            for dep in self.dependencies.dependencies_of(entity) {
                if self.entity_outdated(&dep, in_progress, memo) {
                    outdated = true;
                    break;
                }
            }
        }

        in_progress.remove(entity);
        memo.insert(entity.clone(), outdated);
        outdated
    }

    fn entity_basic_outdated(&self, entity: &Entity) -> bool {
        match entity {
            Entity::Item(identifier) => match self.reps_by_item.get(identifier) {
                Some(keys) => keys.iter().any(|key| match self.reps.get(key) {
                    Some(rep) => rep.force_outdated || !self.basic_reasons(rep).is_empty(),
                    None => true,
                }),
                // An item that vanished or never had reps counts as
                // changed.
                None => true,
            },
            Entity::Layout(identifier) => match self.site.layout(identifier) {
                Some(layout) => {
                    self.checksums.digest(entity, Scope::Content)
                        != Some(&layout.document.content_digest())
                        || self.checksums.digest(entity, Scope::Attributes)
                            != Some(&layout.document.attributes_digest())
                }
                None => true,
            },
            Entity::Config => self.checksums.config_digest() != Some(&self.config_digest),
            Entity::Code => self.checksums.code_digest() != Some(&self.code_digest),
            // Rule changes are detected per rep through the recorded
            // sequence digest.
            Entity::Rules => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Content, Document, Item};
    use crate::rules::ActionRecorder;
    use kiln_types::ValueMap;

    fn item(id: &str, content: &str) -> Item {
        Item::new(Document::new(
            Identifier::full(id),
            Content::text(content),
            ValueMap::new(),
        ))
    }

    fn rep_for(id: &str) -> Rep {
        let sequence = ActionRecorder::new("default").finish().unwrap();
        Rep::new(RepKey::new(Identifier::full(id), "default"), sequence)
    }

    /// Store digests as if the previous run saw the site unchanged.
    fn record_current_state(
        checksums: &mut ChecksumStore,
        site: &Site,
        config: &Config,
        reps: &HashMap<RepKey, Rep>,
    ) {
        for item in site.items() {
            checksums.set_digest(
                item.entity(),
                Scope::Content,
                item.document.content_digest(),
            );
            checksums.set_digest(
                item.entity(),
                Scope::Attributes,
                item.document.attributes_digest(),
            );
        }
        for (key, rep) in reps {
            checksums.set_rule_digest(key.item.clone(), key.name.clone(), rep.sequence.digest());
        }
        checksums.set_config_digest(kiln_incremental::checksum(&config.to_value()));
        checksums.set_code_digest(site.code_digest());
    }

    #[test]
    fn test_fresh_state_reads_as_outdated() {
        let site = Site::new(vec![item("/a.md", "hello")], vec![], vec![]).unwrap();
        let config = Config::default();
        let mut reps = HashMap::new();
        let rep = rep_for("/a.md");
        reps.insert(rep.key.clone(), rep.clone());

        let checksums = ChecksumStore::new();
        let dependencies = DependencyStore::new();
        let checker = OutdatednessChecker::new(&checksums, &dependencies, &site, &config, &reps);

        let reasons = checker.reasons_for(&rep);
        assert!(reasons.contains(&OutdatednessReason::ContentModified));
        assert!(reasons.contains(&OutdatednessReason::RulesModified));
        assert!(checker.is_outdated(&rep));
    }

    #[test]
    fn test_unchanged_state_is_up_to_date() {
        let site = Site::new(vec![item("/a.md", "hello")], vec![], vec![]).unwrap();
        let config = Config::default();
        let mut reps = HashMap::new();
        let rep = rep_for("/a.md");
        reps.insert(rep.key.clone(), rep.clone());

        let mut checksums = ChecksumStore::new();
        record_current_state(&mut checksums, &site, &config, &reps);
        let dependencies = DependencyStore::new();
        let checker = OutdatednessChecker::new(&checksums, &dependencies, &site, &config, &reps);

        assert_eq!(checker.reasons_for(&rep), vec![]);
        assert!(!checker.is_outdated(&rep));
    }

    #[test]
    fn test_attribute_change_reported_separately_from_content() {
        let site = Site::new(vec![item("/a.md", "hello")], vec![], vec![]).unwrap();
        let config = Config::default();
        let mut reps = HashMap::new();
        let rep = rep_for("/a.md");
        reps.insert(rep.key.clone(), rep.clone());

        let mut checksums = ChecksumStore::new();
        record_current_state(&mut checksums, &site, &config, &reps);
        // Pretend only the attributes changed since the digests were
        // stored.
        checksums.set_digest(
            Entity::Item(Identifier::full("/a.md")),
            Scope::Attributes,
            kiln_incremental::checksum_text("old attributes"),
        );

        let dependencies = DependencyStore::new();
        let checker = OutdatednessChecker::new(&checksums, &dependencies, &site, &config, &reps);

        let reasons = checker.reasons_for(&rep);
        assert_eq!(reasons, vec![OutdatednessReason::AttributesModified]);
    }

    #[test]
    fn test_outdatedness_propagates_through_chain() {
        let site = Site::new(
            vec![
                item("/a.md", "uses b"),
                item("/b.md", "uses c"),
                item("/c.md", "stuff"),
            ],
            vec![],
            vec![],
        )
        .unwrap();
        let config = Config::default();
        let mut reps = HashMap::new();
        for id in ["/a.md", "/b.md", "/c.md"] {
            let rep = rep_for(id);
            reps.insert(rep.key.clone(), rep);
        }

        let mut checksums = ChecksumStore::new();
        record_current_state(&mut checksums, &site, &config, &reps);
        checksums.set_digest(
            Entity::Item(Identifier::full("/c.md")),
            Scope::Content,
            kiln_incremental::checksum_text("old"),
        );

        let mut dependencies = DependencyStore::new();
        let a = Entity::Item(Identifier::full("/a.md"));
        let b = Entity::Item(Identifier::full("/b.md"));
        let c = Entity::Item(Identifier::full("/c.md"));
        dependencies.record(&a, &b, kiln_incremental::DependencyProps::compiled_content());
        dependencies.record(&b, &c, kiln_incremental::DependencyProps::compiled_content());

        let checker = OutdatednessChecker::new(&checksums, &dependencies, &site, &config, &reps);
        let rep_of = |id: &str| &reps[&RepKey::new(Identifier::full(id), "default")];

        assert_eq!(
            checker.reasons_for(rep_of("/c.md")),
            vec![OutdatednessReason::ContentModified]
        );
        assert_eq!(
            checker.reasons_for(rep_of("/b.md")),
            vec![OutdatednessReason::DependenciesOutdated]
        );
        assert_eq!(
            checker.reasons_for(rep_of("/a.md")),
            vec![OutdatednessReason::DependenciesOutdated]
        );
    }

    #[test]
    fn test_outdated_dependency_propagates() {
        let site = Site::new(
            vec![item("/a.md", "uses b"), item("/b.md", "stuff")],
            vec![],
            vec![],
        )
        .unwrap();
        let config = Config::default();
        let mut reps = HashMap::new();
        for id in ["/a.md", "/b.md"] {
            let rep = rep_for(id);
            reps.insert(rep.key.clone(), rep);
        }

        let mut checksums = ChecksumStore::new();
        record_current_state(&mut checksums, &site, &config, &reps);
        // Pretend /b.md's content changed since the digests were
        // stored.
        checksums.set_digest(
            Entity::Item(Identifier::full("/b.md")),
            Scope::Content,
            kiln_incremental::checksum_text("old"),
        );

        let mut dependencies = DependencyStore::new();
        dependencies.record(
            &Entity::Item(Identifier::full("/a.md")),
            &Entity::Item(Identifier::full("/b.md")),
            kiln_incremental::DependencyProps::compiled_content(),
        );

        let checker = OutdatednessChecker::new(&checksums, &dependencies, &site, &config, &reps);
        let a = &reps[&RepKey::new(Identifier::full("/a.md"), "default")];
        let b = &reps[&RepKey::new(Identifier::full("/b.md"), "default")];

        assert_eq!(
            checker.reasons_for(b),
            vec![OutdatednessReason::ContentModified]
        );
        assert_eq!(
            checker.reasons_for(a),
            vec![OutdatednessReason::DependenciesOutdated]
        );
    }

    #[test]
    fn test_dependency_cycle_terminates() {
        let site = Site::new(
            vec![item("/a.md", "a"), item("/b.md", "b")],
            vec![],
            vec![],
        )
        .unwrap();
        let config = Config::default();
        let mut reps = HashMap::new();
        for id in ["/a.md", "/b.md"] {
            let rep = rep_for(id);
            reps.insert(rep.key.clone(), rep);
        }

        let mut checksums = ChecksumStore::new();
        record_current_state(&mut checksums, &site, &config, &reps);

        let mut dependencies = DependencyStore::new();
        let a = Entity::Item(Identifier::full("/a.md"));
        let b = Entity::Item(Identifier::full("/b.md"));
        dependencies.record(&a, &b, Default::default());
        dependencies.record(&b, &a, Default::default());

        let checker = OutdatednessChecker::new(&checksums, &dependencies, &site, &config, &reps);
        for rep in reps.values() {
            assert!(!checker.is_outdated(rep));
        }
    }

    #[test]
    fn test_force_outdated_without_reasons() {
        let site = Site::new(vec![item("/a.md", "hello")], vec![], vec![]).unwrap();
        let config = Config::default();
        let mut reps = HashMap::new();
        let mut rep = rep_for("/a.md");
        rep.force_outdated = true;
        reps.insert(rep.key.clone(), rep.clone());

        let mut checksums = ChecksumStore::new();
        record_current_state(&mut checksums, &site, &config, &reps);
        let dependencies = DependencyStore::new();
        let checker = OutdatednessChecker::new(&checksums, &dependencies, &site, &config, &reps);

        assert_eq!(checker.reasons_for(&rep), vec![]);
        assert!(checker.is_outdated(&rep));
    }
}
