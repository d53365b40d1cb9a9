//! The environment a filter runs in.
//!
//! A context borrows the loaded site, the configuration, and the rep
//! table for the current pass. Every read it answers is reported to the
//! dependency tracker, and a read of compiled content that is not
//! available yet surfaces as [`FilterError::UnmetDependency`] so the
//! scheduler can compile the dependency first and retry.

use crate::config::Config;
use crate::model::{Content, Item, Layout, Rep, RepKey, Site};
use crate::tracker::DependencyTracker;
use crate::view::{ItemView, LayoutView};
use kiln_incremental::{DependencyProps, Entity};
use kiln_types::{Identifier, Value, ValueMap};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    /// The referenced rep has not been compiled yet in this pass. The
    /// scheduler treats this as a signal, not a failure.
    #[error("Unmet dependency on {0}")]
    UnmetDependency(RepKey),

    #[error("Unknown item: {0}")]
    UnknownItem(Identifier),

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("No layout matches pattern '{0}'")]
    UnknownLayout(String),

    #[error("{0} has binary content where text was expected")]
    BinaryContent(Identifier),

    #[error("{0}")]
    Message(String),
}

pub struct FilterContext<'a> {
    site: &'a Site,
    config: &'a Config,
    defaults: &'a ValueMap,
    tracker: &'a DependencyTracker,
    reps: &'a HashMap<RepKey, Rep>,
    item: &'a Item,
    layout: Option<&'a Layout>,
    inner_content: Option<&'a str>,
}

impl<'a> FilterContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        site: &'a Site,
        config: &'a Config,
        defaults: &'a ValueMap,
        tracker: &'a DependencyTracker,
        reps: &'a HashMap<RepKey, Rep>,
        item: &'a Item,
    ) -> Self {
        FilterContext {
            site,
            config,
            defaults,
            tracker,
            reps,
            item,
            layout: None,
            inner_content: None,
        }
    }

    /// Variant used while applying a layout: the layout being rendered
    /// and the content it wraps are exposed to the filter.
    pub fn for_layout(mut self, layout: &'a Layout, inner_content: &'a str) -> Self {
        self.layout = Some(layout);
        self.inner_content = Some(inner_content);
        self
    }

    /// View of the item currently being compiled.
    pub fn item(&self) -> ItemView<'a> {
        ItemView::new(self.item, self.defaults, self.tracker)
    }

    pub fn layout(&self) -> Option<LayoutView<'a>> {
        self.layout
            .map(|layout| LayoutView::new(layout, self.defaults, self.tracker))
    }

    /// Content being wrapped when a layout filter runs.
    pub fn inner_content(&self) -> Option<&str> {
        self.inner_content
    }

    /// View of any item in the site.
    pub fn item_view(&self, identifier: &Identifier) -> Result<ItemView<'a>, FilterError> {
        let item = self
            .site
            .item(identifier)
            .ok_or_else(|| FilterError::UnknownItem(identifier.clone()))?;
        Ok(ItemView::new(item, self.defaults, self.tracker))
    }

    /// Compiled content of another item's default rep at snapshot
    /// `last`.
    pub fn compiled_content_of(&self, identifier: &Identifier) -> Result<String, FilterError> {
        self.compiled_content(identifier, "default", "last")
    }

    /// Compiled content of a named rep at a named snapshot. Records a
    /// compiled-content dependency before looking anything up, so the
    /// edge exists even when the read fails.
    pub fn compiled_content(
        &self,
        identifier: &Identifier,
        rep_name: &str,
        snapshot: &str,
    ) -> Result<String, FilterError> {
        self.tracker.record(
            Entity::Item(identifier.clone()),
            DependencyProps::compiled_content(),
        );
        if self.site.item(identifier).is_none() {
            return Err(FilterError::UnknownItem(identifier.clone()));
        }
        let key = RepKey::new(identifier.clone(), rep_name);
        let rep = match self.reps.get(&key) {
            Some(rep) if rep.compiled => rep,
            _ => return Err(FilterError::UnmetDependency(key)),
        };
        match rep.snapshot(snapshot) {
            Some(Content::Text(text)) => Ok(text.clone()),
            Some(Content::Binary(_)) => Err(FilterError::BinaryContent(identifier.clone())),
            // The rep finished without producing this snapshot, so
            // retrying can never succeed.
            None => Err(FilterError::Message(format!(
                "{key} has no snapshot named '{snapshot}'"
            ))),
        }
    }

    /// Configuration lookup, pinning the configuration as a
    /// dependency.
    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.tracker
            .record(Entity::Config, DependencyProps::attributes());
        self.config.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use crate::rules::ActionSequence;
    use kiln_incremental::DependencyStore;
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn item(id: &str, content: &str) -> Item {
        Item::new(Document::new(
            Identifier::full(id),
            Content::text(content),
            ValueMap::new(),
        ))
    }

    struct Fixture {
        site: Site,
        config: Config,
        defaults: ValueMap,
        tracker: DependencyTracker,
        reps: HashMap<RepKey, Rep>,
    }

    fn fixture() -> Fixture {
        let site = Site::new(
            vec![item("/a.md", "alpha"), item("/b.md", "beta")],
            vec![],
            vec![],
        )
        .unwrap();
        Fixture {
            site,
            config: Config::default(),
            defaults: ValueMap::new(),
            tracker: DependencyTracker::new(Arc::new(RwLock::new(DependencyStore::new()))),
            reps: HashMap::new(),
        }
    }

    #[test]
    fn test_uncompiled_rep_reads_as_unmet_dependency() {
        let fx = fixture();
        let a = fx.site.item(&Identifier::full("/a.md")).unwrap();
        let ctx = FilterContext::new(
            &fx.site, &fx.config, &fx.defaults, &fx.tracker, &fx.reps, a,
        );

        let err = ctx.compiled_content_of(&Identifier::full("/b.md")).unwrap_err();
        assert!(matches!(
            err,
            FilterError::UnmetDependency(key) if key.item == Identifier::full("/b.md")
        ));
    }

    #[test]
    fn test_compiled_rep_reads_snapshot_text() {
        let mut fx = fixture();
        let key = RepKey::new(Identifier::full("/b.md"), "default");
        let mut rep = Rep::new(key.clone(), ActionSequence::default());
        rep.snapshots.insert("last".to_string(), Content::text("<p>beta</p>"));
        rep.compiled = true;
        fx.reps.insert(key, rep);

        let a = fx.site.item(&Identifier::full("/a.md")).unwrap();
        let ctx = FilterContext::new(
            &fx.site, &fx.config, &fx.defaults, &fx.tracker, &fx.reps, a,
        );
        assert_eq!(
            ctx.compiled_content_of(&Identifier::full("/b.md")).unwrap(),
            "<p>beta</p>"
        );
    }

    #[test]
    fn test_missing_item_is_an_error_not_a_signal() {
        let fx = fixture();
        let a = fx.site.item(&Identifier::full("/a.md")).unwrap();
        let ctx = FilterContext::new(
            &fx.site, &fx.config, &fx.defaults, &fx.tracker, &fx.reps, a,
        );
        assert!(matches!(
            ctx.compiled_content_of(&Identifier::full("/nope.md")),
            Err(FilterError::UnknownItem(_))
        ));
    }
}
