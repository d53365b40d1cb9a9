//! Read-tracking views over documents.
//!
//! Filters never touch `Item` or `Layout` directly; they get a view
//! that answers facet reads and reports each read to the dependency
//! tracker, so the dependency graph reflects exactly what a compilation
//! consumed.

use crate::model::{Content, Item, Layout};
use crate::tracker::DependencyTracker;
use kiln_incremental::{DependencyProps, Entity};
use kiln_types::{Identifier, Value, ValueMap};

pub struct ItemView<'a> {
    item: &'a Item,
    defaults: &'a ValueMap,
    tracker: &'a DependencyTracker,
}

impl<'a> ItemView<'a> {
    pub fn new(item: &'a Item, defaults: &'a ValueMap, tracker: &'a DependencyTracker) -> Self {
        ItemView {
            item,
            defaults,
            tracker,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        self.item.identifier()
    }

    /// Attribute lookup with site-wide fallback. The item's attributes
    /// are consulted first; a miss falls through to the configured
    /// defaults, recording a configuration dependency as well.
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.tracker
            .record(self.item.entity(), DependencyProps::attributes());
        if let Some(value) = self.item.document.attributes.get(key) {
            return Some(value.clone());
        }
        self.tracker
            .record(Entity::Config, DependencyProps::attributes());
        self.defaults.get(key).cloned()
    }

    pub fn raw_content(&self) -> &Content {
        self.tracker
            .record(self.item.entity(), DependencyProps::raw_content());
        &self.item.document.content
    }

    /// Raw textual content, `None` for binary items.
    pub fn raw_text(&self) -> Option<&str> {
        self.raw_content().as_text()
    }
}

pub struct LayoutView<'a> {
    layout: &'a Layout,
    defaults: &'a ValueMap,
    tracker: &'a DependencyTracker,
}

impl<'a> LayoutView<'a> {
    pub fn new(layout: &'a Layout, defaults: &'a ValueMap, tracker: &'a DependencyTracker) -> Self {
        LayoutView {
            layout,
            defaults,
            tracker,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        self.layout.identifier()
    }

    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.tracker
            .record(self.layout.entity(), DependencyProps::attributes());
        if let Some(value) = self.layout.document.attributes.get(key) {
            return Some(value.clone());
        }
        self.tracker
            .record(Entity::Config, DependencyProps::attributes());
        self.defaults.get(key).cloned()
    }

    pub fn raw_content(&self) -> &Content {
        self.tracker
            .record(self.layout.entity(), DependencyProps::raw_content());
        &self.layout.document.content
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.raw_content().as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use kiln_incremental::DependencyStore;
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn tracker() -> (Arc<RwLock<DependencyStore>>, DependencyTracker) {
        let store = Arc::new(RwLock::new(DependencyStore::new()));
        let tracker = DependencyTracker::new(store.clone());
        (store, tracker)
    }

    fn item(id: &str, content: &str, attrs: ValueMap) -> Item {
        Item::new(Document::new(
            Identifier::full(id),
            Content::text(content),
            attrs,
        ))
    }

    #[test]
    fn test_attribute_falls_back_to_defaults() {
        let (_, tracker) = tracker();
        let mut attrs = ValueMap::new();
        attrs.insert("title", "Own title");
        let item = item("/a.md", "", attrs);

        let mut defaults = ValueMap::new();
        defaults.insert("author", "someone");
        let view = ItemView::new(&item, &defaults, &tracker);

        assert_eq!(view.attribute("title"), Some(Value::from("Own title")));
        assert_eq!(view.attribute("author"), Some(Value::from("someone")));
        assert_eq!(view.attribute("missing"), None);
    }

    #[test]
    fn test_reads_record_scoped_dependencies() {
        let (store, tracker) = tracker();
        let item = item("/a.md", "body", ValueMap::new());
        let defaults = ValueMap::new();
        let view = ItemView::new(&item, &defaults, &tracker);

        tracker.enter(Entity::Item(Identifier::full("/page.md")));
        let _ = view.attribute("title");
        let _ = view.raw_text();
        tracker.exit();

        let store = store.read();
        let from = Entity::Item(Identifier::full("/page.md"));
        let props = store.props(&from, &item.entity()).unwrap();
        assert!(props.attributes);
        assert!(props.raw_content);
        assert!(!props.compiled_content);
        // The defaults fallback also pins the configuration.
        assert!(store.props(&from, &Entity::Config).is_some());
    }
}
