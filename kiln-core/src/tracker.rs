//! Dependency tracking during compilation.
//!
//! The compiler pushes the entity it is currently compiling; facet
//! reads on views and contexts report what was read, and the tracker
//! records an edge from the entity on top of the stack to the entity
//! that was read. Outside a compilation frame reads are not recorded.

use kiln_incremental::{DependencyProps, DependencyStore, Entity};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone)]
pub struct DependencyTracker {
    store: Arc<RwLock<DependencyStore>>,
    active: Arc<RwLock<Vec<Entity>>>,
}

impl DependencyTracker {
    pub fn new(store: Arc<RwLock<DependencyStore>>) -> Self {
        DependencyTracker {
            store,
            active: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn store(&self) -> &Arc<RwLock<DependencyStore>> {
        &self.store
    }

    /// Begin recording reads on behalf of `entity`.
    pub fn enter(&self, entity: Entity) {
        self.active.write().push(entity);
    }

    /// Stop recording for the most recently entered entity.
    pub fn exit(&self) {
        let popped = self.active.write().pop();
        if popped.is_none() {
            tracing::warn!("Dependency tracker exited with no active entity");
        }
    }

    /// Record that the active entity read a facet of `to`. A no-op
    /// when no compilation frame is active.
    pub fn record(&self, to: Entity, props: DependencyProps) {
        let active = self.active.read();
        if let Some(from) = active.last() {
            tracing::trace!("Dependency: {} -> {} ({})", from, to, props);
            self.store.write().record(from, &to, props);
        }
    }
}
