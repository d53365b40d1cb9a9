//! Filter registry.
//!
//! Filters are looked up by name at execution time; rule blocks only
//! record names, so a rule table can be built before the registry is
//! populated.

use crate::context::{FilterContext, FilterError};
use crate::filters;
use kiln_types::ValueMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A named content transformation.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(
        &self,
        content: &str,
        args: &ValueMap,
        ctx: &FilterContext<'_>,
    ) -> Result<String, FilterError>;
}

#[derive(Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        FilterRegistry::default()
    }

    /// Registry preloaded with the built-in filters.
    pub fn with_builtins() -> Self {
        let mut registry = FilterRegistry::new();
        registry.register(Arc::new(filters::MarkdownFilter));
        registry.register(Arc::new(filters::EmbedFilter));
        registry.register(Arc::new(filters::PlaceholderFilter));
        registry
    }

    pub fn register(&mut self, filter: Arc<dyn Filter>) {
        self.filters.insert(filter.name().to_string(), filter);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Filter>, FilterError> {
        self.filters
            .get(name)
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))
    }
}
