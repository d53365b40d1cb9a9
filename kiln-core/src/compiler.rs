//! The compilation scheduler.
//!
//! Outdated reps are compiled in declaration order. A filter that
//! demands compiled content which does not exist yet aborts the current
//! rep with an unmet-dependency signal; the scheduler compiles the
//! required rep first and retries from the top of the action sequence.
//! The rep stack doubles as the cycle detector: demanding a rep that is
//! already on the stack is a true dependency cycle and halts the run.

use crate::config::Config;
use crate::context::{FilterContext, FilterError};
use crate::listener::{CompilationListener, NullListener};
use crate::model::{Content, Rep, RepKey, Site};
use crate::outdatedness::{OutdatednessChecker, OutdatednessReason};
use crate::registry::FilterRegistry;
use crate::rules::{Action, ActionSequence, RuleError, RuleTable};
use crate::tracker::DependencyTracker;
use kiln_incremental::{
    ChecksumStore, DependencyProps, DependencyStore, Entity, Scope, StoreError,
};
use kiln_types::{Identifier, Pattern, ValueMap};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

fn cycle_path(path: &[RepKey]) -> String {
    path.iter()
        .map(RepKey::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Error, Debug)]
pub enum CompileError {
    /// A rep transitively demanded its own compiled content. The path
    /// runs from the outermost rep to the repeated one.
    #[error("Dependency cycle: {}", cycle_path(.0))]
    DependencyCycle(Vec<RepKey>),

    /// Internal scheduling signal; never escapes a full run.
    #[error("Unmet dependency on {0}")]
    UnmetDependency(RepKey),

    #[error("Item disappeared during compilation: {0}")]
    MissingItem(Identifier),

    #[error("No rep named '{}' was planned for {}", .0.name, .0.item)]
    UnknownRep(RepKey),

    #[error("{rep} declared an output path for snapshot '{snapshot}' but never took it")]
    MissingSnapshot { rep: RepKey, snapshot: String },

    #[error("Output path escapes the output directory: {}", .0.display())]
    UnsafeOutputPath(PathBuf),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("Filter failed: {0}")]
    Filter(FilterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    fn from_filter(err: FilterError) -> Self {
        match err {
            FilterError::UnmetDependency(key) => CompileError::UnmetDependency(key),
            other => CompileError::Filter(other),
        }
    }
}

#[derive(Debug, Default)]
pub struct CompileSummary {
    pub compiled: usize,
    pub skipped: usize,
    pub written: Vec<PathBuf>,
}

pub struct Compiler {
    site: Site,
    config: Config,
    rules: RuleTable,
    registry: FilterRegistry,
    listener: Box<dyn CompilationListener>,
    dependency_store: Arc<RwLock<DependencyStore>>,
    checksum_store: ChecksumStore,
    tracker: DependencyTracker,
    defaults: ValueMap,
    reps: HashMap<RepKey, Rep>,
    rep_order: Vec<RepKey>,
    stack: Vec<RepKey>,
    stack_set: HashSet<RepKey>,
    written: Vec<PathBuf>,
}

impl Compiler {
    pub fn new(
        config: Config,
        site: Site,
        rules: RuleTable,
        registry: FilterRegistry,
    ) -> Result<Self, CompileError> {
        let dependency_store = Arc::new(RwLock::new(DependencyStore::load(
            config.dependency_store_path(),
        )));
        let checksum_store = ChecksumStore::load(config.checksum_store_path());
        let tracker = DependencyTracker::new(dependency_store.clone());
        let defaults = config.default_attributes();

        let mut reps = HashMap::new();
        let mut rep_order = Vec::new();
        for item in site.items() {
            let matched = rules.rules_for(item.identifier());
            if matched.is_empty() {
                return Err(RuleError::NoMatchingRule(item.identifier().clone()).into());
            }
            for rule in matched {
                let sequence = rule.record(item.identifier())?;
                let key = RepKey::new(item.identifier().clone(), rule.rep_name.clone());
                rep_order.push(key.clone());
                reps.insert(key.clone(), Rep::new(key, sequence));
            }
        }
        tracing::debug!("Planned {} reps for {} items", rep_order.len(), site.items().len());

        Ok(Compiler {
            site,
            config,
            rules,
            registry,
            listener: Box::new(NullListener),
            dependency_store,
            checksum_store,
            tracker,
            defaults,
            reps,
            rep_order,
            stack: Vec::new(),
            stack_set: HashSet::new(),
            written: Vec::new(),
        })
    }

    pub fn with_listener(mut self, listener: Box<dyn CompilationListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Mark every rep whose item matches as outdated regardless of
    /// stored state.
    pub fn force_outdated(&mut self, pattern: &Pattern) {
        for rep in self.reps.values_mut() {
            if pattern.matches(&rep.key.item) {
                rep.force_outdated = true;
            }
        }
    }

    /// Outdatedness reasons per rep, in declaration order, without
    /// compiling anything.
    pub fn status(&self) -> Vec<(RepKey, Vec<OutdatednessReason>)> {
        let deps = self.dependency_store.read();
        let checker = OutdatednessChecker::new(
            &self.checksum_store,
            &deps,
            &self.site,
            &self.config,
            &self.reps,
        );
        self.rep_order
            .iter()
            .map(|key| (key.clone(), checker.reasons_for(&self.reps[key])))
            .collect()
    }

    /// Compile everything that is outdated, then persist dependency
    /// and checksum state for the next run.
    pub fn run(&mut self) -> Result<CompileSummary, CompileError> {
        let outdated = self.outdated_keys();
        tracing::info!(
            "{} of {} reps outdated",
            outdated.len(),
            self.rep_order.len()
        );

        // Stale edges from the previous run are re-recorded during
        // recompilation if they still hold.
        {
            let mut deps = self.dependency_store.write();
            let items: HashSet<Identifier> =
                outdated.iter().map(|key| key.item.clone()).collect();
            for identifier in &items {
                deps.forget_dependencies_of(&Entity::Item(identifier.clone()));
            }
        }

        let order = self.rep_order.clone();
        for key in &order {
            if self.reps[key].compiled {
                continue;
            }
            if outdated.contains(key) {
                self.compile_with_deps(key)?;
            } else {
                self.listener.compilation_skipped(key);
            }
        }

        self.persist_state()?;

        let compiled = self.reps.values().filter(|rep| rep.compiled).count();
        Ok(CompileSummary {
            compiled,
            skipped: self.rep_order.len() - compiled,
            written: std::mem::take(&mut self.written),
        })
    }

    fn outdated_keys(&self) -> HashSet<RepKey> {
        let deps = self.dependency_store.read();
        let checker = OutdatednessChecker::new(
            &self.checksum_store,
            &deps,
            &self.site,
            &self.config,
            &self.reps,
        );
        self.reps
            .values()
            .filter(|rep| checker.is_outdated(rep))
            .map(|rep| rep.key.clone())
            .collect()
    }

    /// Compile `key`, recursively compiling whatever it turns out to
    /// need. The blocked rep stays on the stack while its dependency
    /// compiles, so a cycle shows up as the required rep already being
    /// on the stack.
    fn compile_with_deps(&mut self, key: &RepKey) -> Result<(), CompileError> {
        loop {
            match self.compile_once(key) {
                Ok(()) => return Ok(()),
                Err(CompileError::UnmetDependency(required)) => {
                    if self.stack_set.contains(&required) {
                        return Err(self.cycle_error(&required));
                    }
                    self.compile_with_deps(&required)?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One attempt at a rep, from the top of its action sequence.
    fn compile_once(&mut self, key: &RepKey) -> Result<(), CompileError> {
        let resumed = self.stack.last() == Some(key);
        if !resumed {
            if self.stack_set.contains(key) {
                return Err(self.cycle_error(key));
            }
            self.stack.push(key.clone());
            self.stack_set.insert(key.clone());
        }

        match self.reps.get_mut(key) {
            Some(rep) => rep.reset(),
            // The item exists but no rule planned a rep by this name,
            // typically a filter demanding a misspelled rep.
            None => {
                self.stack.pop();
                self.stack_set.remove(key);
                return Err(CompileError::UnknownRep(key.clone()));
            }
        }
        let sequence = self.reps[key].sequence.clone();

        self.listener.compilation_started(key);
        self.tracker.enter(Entity::Item(key.item.clone()));
        let result = self.run_actions(key, &sequence);
        self.tracker.exit();

        match result {
            Ok(snapshots) => {
                self.stack.pop();
                self.stack_set.remove(key);
                if let Some(rep) = self.reps.get_mut(key) {
                    rep.snapshots = snapshots;
                    rep.compiled = true;
                }
                self.write_outputs(key)?;
                self.listener.compilation_ended(key);
                Ok(())
            }
            Err(CompileError::UnmetDependency(required)) => {
                tracing::debug!("{} blocked on {}", key, required);
                // Stays on the stack for the retry.
                Err(CompileError::UnmetDependency(required))
            }
            Err(err) => {
                self.stack.pop();
                self.stack_set.remove(key);
                Err(err)
            }
        }
    }

    fn cycle_error(&self, required: &RepKey) -> CompileError {
        let start = self
            .stack
            .iter()
            .position(|key| key == required)
            .unwrap_or(0);
        let mut path = self.stack[start..].to_vec();
        path.push(required.clone());
        CompileError::DependencyCycle(path)
    }

    fn run_actions(
        &self,
        key: &RepKey,
        sequence: &ActionSequence,
    ) -> Result<HashMap<String, Content>, CompileError> {
        let item = self
            .site
            .item(&key.item)
            .ok_or_else(|| CompileError::MissingItem(key.item.clone()))?;

        let mut working = item.document.content.clone();
        let mut snapshots = HashMap::new();

        for action in sequence.actions() {
            match action {
                Action::Filter { name, args } => {
                    let text = self.text_of(&working, key)?;
                    let filter = self.registry.get(name).map_err(CompileError::from_filter)?;
                    self.listener.filtering_started(key, name);
                    let ctx = FilterContext::new(
                        &self.site,
                        &self.config,
                        &self.defaults,
                        &self.tracker,
                        &self.reps,
                        item,
                    );
                    let out = filter
                        .apply(&text, args, &ctx)
                        .map_err(CompileError::from_filter)?;
                    self.listener.filtering_ended(key, name);
                    working = Content::Text(out);
                }
                Action::Layout { pattern } => {
                    let text = self.text_of(&working, key)?;
                    let layout = self
                        .site
                        .layout_matching(&Pattern::glob(pattern))
                        .ok_or_else(|| {
                            CompileError::Filter(FilterError::UnknownLayout(pattern.clone()))
                        })?;
                    self.tracker.record(
                        layout.entity(),
                        DependencyProps {
                            raw_content: true,
                            attributes: true,
                            ..Default::default()
                        },
                    );

                    let layout_rule = self
                        .rules
                        .layout_rule_for(layout.identifier())
                        .ok_or_else(|| {
                            RuleError::CannotDetermineFilter(layout.identifier().clone())
                        })?;
                    let (filter_name, layout_args) =
                        (layout_rule.filter_name.clone(), layout_rule.args.clone());
                    let filter = self
                        .registry
                        .get(&filter_name)
                        .map_err(CompileError::from_filter)?;
                    self.listener.filtering_started(key, &filter_name);
                    let ctx = FilterContext::new(
                        &self.site,
                        &self.config,
                        &self.defaults,
                        &self.tracker,
                        &self.reps,
                        item,
                    )
                    .for_layout(layout, &text);
                    let out = filter
                        .apply(&text, &layout_args, &ctx)
                        .map_err(CompileError::from_filter)?;
                    self.listener.filtering_ended(key, &filter_name);
                    working = Content::Text(out);
                }
                Action::Snapshot { name, .. } => {
                    snapshots.insert(name.clone(), working.clone());
                }
            }
        }
        Ok(snapshots)
    }

    fn text_of(&self, content: &Content, key: &RepKey) -> Result<String, CompileError> {
        match content {
            Content::Text(text) => Ok(text.clone()),
            Content::Binary(_) => Err(CompileError::Filter(FilterError::BinaryContent(
                key.item.clone(),
            ))),
        }
    }

    fn write_outputs(&mut self, key: &RepKey) -> Result<(), CompileError> {
        let mut targets = Vec::new();
        {
            let rep = &self.reps[key];
            for (snapshot, rel) in &rep.paths {
                let content = rep.snapshots.get(snapshot).ok_or_else(|| {
                    CompileError::MissingSnapshot {
                        rep: key.clone(),
                        snapshot: snapshot.clone(),
                    }
                })?;
                targets.push((self.output_path(key, rel)?, content.clone()));
            }
        }
        for (target, content) in targets {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_atomic(&target, &content)?;
            self.listener.file_written(&target);
            self.written.push(target);
        }
        Ok(())
    }

    /// Join a declared output path onto the output directory. Paths
    /// must stay inside it, so parent components are rejected.
    fn output_path(&self, key: &RepKey, rel: &Path) -> Result<PathBuf, CompileError> {
        let mut clean = PathBuf::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    tracing::warn!("{} declared output path {}", key, rel.display());
                    return Err(CompileError::UnsafeOutputPath(rel.to_path_buf()));
                }
            }
        }
        Ok(self.config.output_dir().join(clean))
    }

    fn persist_state(&mut self) -> Result<(), CompileError> {
        for item in self.site.items() {
            self.checksum_store.set_digest(
                item.entity(),
                Scope::Content,
                item.document.content_digest(),
            );
            self.checksum_store.set_digest(
                item.entity(),
                Scope::Attributes,
                item.document.attributes_digest(),
            );
        }
        for layout in self.site.layouts() {
            self.checksum_store.set_digest(
                layout.entity(),
                Scope::Content,
                layout.document.content_digest(),
            );
            self.checksum_store.set_digest(
                layout.entity(),
                Scope::Attributes,
                layout.document.attributes_digest(),
            );
        }
        for (key, rep) in &self.reps {
            self.checksum_store.set_rule_digest(
                key.item.clone(),
                key.name.clone(),
                rep.sequence.digest(),
            );
        }
        self.checksum_store
            .set_config_digest(kiln_incremental::checksum(&self.config.to_value()));
        self.checksum_store.set_code_digest(self.site.code_digest());

        self.checksum_store.save()?;
        self.dependency_store.read().save()?;
        Ok(())
    }
}

/// Write through a sibling temp file so readers never observe a
/// half-written output.
fn write_atomic(target: &Path, content: &Content) -> std::io::Result<()> {
    let mut tmp_name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = target.with_file_name(tmp_name);
    match content {
        Content::Text(text) => std::fs::write(&tmp, text.as_bytes())?,
        Content::Binary(bin) => {
            std::fs::copy(&bin.path, &tmp)?;
        }
    }
    std::fs::rename(&tmp, target)
}
