//! Compilation rules and recorded action sequences.
//!
//! A rule pairs an identifier pattern with a block that, when run
//! against a matching item, records the actions to perform: filters,
//! layout applications, and snapshots. The recorded sequence is both
//! the build plan executed by the compiler and, serialized to a value
//! and fingerprinted, the cache key that detects rule changes.

use kiln_incremental::{checksum, Digest};
use kiln_types::{Identifier, Pattern, Value, ValueMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("No matching compilation rule for {0}")]
    NoMatchingRule(Identifier),

    #[error("Duplicate snapshot name '{name}' recorded for {rep}")]
    DuplicateSnapshot { rep: String, name: String },

    #[error("No layout rule names a filter for layout {0}")]
    CannotDetermineFilter(Identifier),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Filter { name: String, args: ValueMap },
    Layout { pattern: String },
    Snapshot { name: String, path: Option<PathBuf> },
}

impl Action {
    fn to_value(&self) -> Value {
        let mut map = ValueMap::new();
        match self {
            Action::Filter { name, args } => {
                map.insert("action", "filter");
                map.insert("name", name.as_str());
                map.insert("args", Value::Map(args.clone()));
            }
            Action::Layout { pattern } => {
                map.insert("action", "layout");
                map.insert("pattern", pattern.as_str());
            }
            Action::Snapshot { name, path } => {
                map.insert("action", "snapshot");
                map.insert("name", name.as_str());
                match path {
                    Some(path) => map.insert("path", path.to_string_lossy().to_string()),
                    None => map.insert("path", Value::Null),
                }
            }
        }
        Value::Map(map)
    }
}

/// The ordered actions recorded for one rep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSequence {
    actions: Vec<Action>,
}

impl ActionSequence {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Snapshot names paired with the output paths declared for them.
    pub fn declared_paths(&self) -> Vec<(String, PathBuf)> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                Action::Snapshot {
                    name,
                    path: Some(path),
                } => Some((name.clone(), path.clone())),
                _ => None,
            })
            .collect()
    }

    /// Structured form of the sequence, the input to [`digest`].
    ///
    /// [`digest`]: ActionSequence::digest
    pub fn to_value(&self) -> Value {
        Value::List(self.actions.iter().map(Action::to_value).collect())
    }

    pub fn digest(&self) -> Digest {
        checksum(&self.to_value())
    }
}

/// Collects the actions a rule block declares for one rep.
pub struct ActionRecorder {
    rep: String,
    actions: Vec<Action>,
    error: Option<RuleError>,
}

impl ActionRecorder {
    pub fn new(rep: impl Into<String>) -> Self {
        ActionRecorder {
            rep: rep.into(),
            actions: Vec::new(),
            error: None,
        }
    }

    pub fn filter(&mut self, name: impl Into<String>, args: ValueMap) {
        self.actions.push(Action::Filter {
            name: name.into(),
            args,
        });
    }

    pub fn layout(&mut self, pattern: impl Into<String>) {
        self.actions.push(Action::Layout {
            pattern: pattern.into(),
        });
    }

    pub fn snapshot(&mut self, name: impl Into<String>, path: Option<PathBuf>) {
        let name = name.into();
        let duplicate = self.actions.iter().any(|action| {
            matches!(action, Action::Snapshot { name: existing, .. } if *existing == name)
        });
        if duplicate && self.error.is_none() {
            self.error = Some(RuleError::DuplicateSnapshot {
                rep: self.rep.clone(),
                name: name.clone(),
            });
        }
        self.actions.push(Action::Snapshot { name, path });
    }

    /// Shorthand for routing the final snapshot to an output path.
    pub fn write(&mut self, path: impl Into<PathBuf>) {
        self.snapshot("last", Some(path.into()));
    }

    /// Close the recording. A trailing `last` snapshot is appended if
    /// the block did not declare one itself.
    pub fn finish(mut self) -> Result<ActionSequence, RuleError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let has_last = self.actions.iter().any(
            |action| matches!(action, Action::Snapshot { name, .. } if name == "last"),
        );
        if !has_last {
            self.actions.push(Action::Snapshot {
                name: "last".to_string(),
                path: None,
            });
        }
        Ok(ActionSequence {
            actions: self.actions,
        })
    }
}

type RuleBlock = Arc<dyn Fn(&mut ActionRecorder, &Identifier) + Send + Sync>;

/// One compilation rule: pattern, rep name, and the block that records
/// the rep's actions. The block receives the matched item's identifier
/// so output paths can be derived from it.
#[derive(Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub rep_name: String,
    block: RuleBlock,
}

impl Rule {
    pub fn new(
        pattern: Pattern,
        rep_name: impl Into<String>,
        block: impl Fn(&mut ActionRecorder, &Identifier) + Send + Sync + 'static,
    ) -> Self {
        Rule {
            pattern,
            rep_name: rep_name.into(),
            block: Arc::new(block),
        }
    }

    pub fn record(&self, identifier: &Identifier) -> Result<ActionSequence, RuleError> {
        let mut recorder = ActionRecorder::new(self.rep_name.clone());
        (self.block)(&mut recorder, identifier);
        recorder.finish()
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("pattern", &self.pattern.to_string())
            .field("rep_name", &self.rep_name)
            .finish()
    }
}

/// Maps a layout identifier pattern to the filter that renders it.
#[derive(Debug, Clone)]
pub struct LayoutRule {
    pub pattern: Pattern,
    pub filter_name: String,
    pub args: ValueMap,
}

impl LayoutRule {
    pub fn new(pattern: Pattern, filter_name: impl Into<String>, args: ValueMap) -> Self {
        LayoutRule {
            pattern,
            filter_name: filter_name.into(),
            args,
        }
    }
}

/// Ordered rule collection. For each rep name, the first declared rule
/// whose pattern matches an item wins; later matches for the same rep
/// name are shadowed.
#[derive(Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    layout_rules: Vec<LayoutRule>,
}

impl RuleTable {
    pub fn new() -> Self {
        RuleTable::default()
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn add_layout_rule(&mut self, rule: LayoutRule) {
        self.layout_rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The winning rule per rep name for an item, in declaration
    /// order of first appearance. Empty means no rule matches.
    pub fn rules_for(&self, identifier: &Identifier) -> Vec<&Rule> {
        let mut seen: Vec<&str> = Vec::new();
        let mut matched = Vec::new();
        for rule in &self.rules {
            if !rule.pattern.matches(identifier) {
                continue;
            }
            if seen.contains(&rule.rep_name.as_str()) {
                continue;
            }
            seen.push(&rule.rep_name);
            matched.push(rule);
        }
        matched
    }

    /// First layout rule whose pattern matches.
    pub fn layout_rule_for(&self, identifier: &Identifier) -> Option<&LayoutRule> {
        self.layout_rules
            .iter()
            .find(|rule| rule.pattern.matches(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_declared_rule_wins_per_rep() {
        let mut table = RuleTable::new();
        table.add_rule(Rule::new(Pattern::glob("/posts/*"), "default", |rec, _| {
            rec.filter("markdown", ValueMap::new());
        }));
        table.add_rule(Rule::new(Pattern::glob("/**/*"), "default", |_, _| {}));
        table.add_rule(Rule::new(Pattern::glob("/posts/*"), "feed", |_, _| {}));

        let matched = table.rules_for(&Identifier::full("/posts/a.md"));
        let names: Vec<(&str, String)> = matched
            .iter()
            .map(|r| (r.rep_name.as_str(), r.pattern.to_string()))
            .collect();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], ("default", "/posts/*".to_string()));
        assert_eq!(names[1], ("feed", "/posts/*".to_string()));

        // The catch-all still picks up everything else.
        let other = table.rules_for(&Identifier::full("/about.md"));
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].pattern.to_string(), "/**/*");
    }

    #[test]
    fn test_recorded_sequence_gets_trailing_last_snapshot() {
        let rule = Rule::new(Pattern::glob("/**/*"), "default", |rec, _| {
            rec.filter("markdown", ValueMap::new());
        });
        let sequence = rule.record(&Identifier::full("/x.md")).unwrap();
        assert!(matches!(
            sequence.actions().last(),
            Some(Action::Snapshot { name, path: None }) if name == "last"
        ));
    }

    #[test]
    fn test_explicit_last_snapshot_not_duplicated() {
        let rule = Rule::new(Pattern::glob("/**/*"), "default", |rec, _| {
            rec.write("/a/index.html");
        });
        let sequence = rule.record(&Identifier::full("/x.md")).unwrap();
        let last_count = sequence
            .actions()
            .iter()
            .filter(|a| matches!(a, Action::Snapshot { name, .. } if name == "last"))
            .count();
        assert_eq!(last_count, 1);
        assert_eq!(
            sequence.declared_paths(),
            vec![("last".to_string(), PathBuf::from("/a/index.html"))]
        );
    }

    #[test]
    fn test_duplicate_snapshot_name_rejected() {
        let rule = Rule::new(Pattern::glob("/**/*"), "default", |rec, _| {
            rec.snapshot("raw", None);
            rec.snapshot("raw", None);
        });
        assert!(matches!(
            rule.record(&Identifier::full("/x.md")),
            Err(RuleError::DuplicateSnapshot { name, .. }) if name == "raw"
        ));
    }

    #[test]
    fn test_sequence_digest_tracks_actions_and_order() {
        let seq = |f: fn(&mut ActionRecorder)| {
            let mut rec = ActionRecorder::new("default");
            f(&mut rec);
            rec.finish().unwrap()
        };

        let a = seq(|rec| {
            rec.filter("markdown", ValueMap::new());
            rec.layout("/default.*");
        });
        let b = seq(|rec| {
            rec.layout("/default.*");
            rec.filter("markdown", ValueMap::new());
        });
        let c = seq(|rec| {
            rec.filter("markdown", ValueMap::new());
            rec.layout("/default.*");
        });

        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), c.digest());
    }
}
