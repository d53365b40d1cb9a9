//! Persisted graph of "outdated because of" relationships.
//!
//! Edges run from a dependency to its dependent, so outdatedness flows
//! forward along edges and a rep's influences are the predecessors of
//! its document. Recording is idempotent and self-edges are dropped.

use crate::entity::Entity;
use crate::graph::{DepGraph, DependencyProps, GraphData};
use crate::store::{self, StoreError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Default)]
pub struct DependencyStore {
    graph: DepGraph<Entity>,
    path: Option<PathBuf>,
}

impl DependencyStore {
    /// In-memory store with no backing file.
    pub fn new() -> Self {
        DependencyStore::default()
    }

    /// Load from disk; an unreadable or incompatible file yields an
    /// empty graph.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data: GraphData<Entity> = store::load(&path, STORE_VERSION);
        tracing::debug!(
            "Loaded dependency store from {} ({} vertices)",
            path.display(),
            data.vertices.len()
        );
        DependencyStore {
            graph: DepGraph::from_data(data),
            path: Some(path),
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            store::save(path, STORE_VERSION, &self.graph.to_data())?;
        }
        Ok(())
    }

    /// Record that building `from` observed the given facets of `to`.
    pub fn record(&mut self, from: &Entity, to: &Entity, props: DependencyProps) {
        if from == to {
            return;
        }
        self.graph.add_edge(to, from, props);
    }

    /// The entities `entity` directly depends on.
    pub fn dependencies_of(&self, entity: &Entity) -> Vec<Entity> {
        self.graph.direct_predecessors_of(entity)
    }

    /// The entities that directly depend on `entity`.
    pub fn dependents_of(&self, entity: &Entity) -> Vec<Entity> {
        self.graph.direct_successors_of(entity)
    }

    /// Everything `entity` depends on, transitively.
    pub fn transitive_dependencies_of(&self, entity: &Entity) -> HashSet<Entity> {
        self.graph.predecessors_of(entity)
    }

    pub fn props(&self, from: &Entity, to: &Entity) -> Option<DependencyProps> {
        self.graph.edge_props(to, from)
    }

    /// Drop everything `entity` was recorded to depend on, ahead of a
    /// recompile that will re-record the edges that still hold.
    pub fn forget_dependencies_of(&mut self, entity: &Entity) {
        for dependency in self.graph.direct_predecessors_of(entity) {
            self.graph.delete_edge(&dependency, entity);
        }
    }

    pub fn graph(&self) -> &DepGraph<Entity> {
        &self.graph
    }
}
