//! Directed graph of outdatedness-causing edges.
//!
//! Vertices are added lazily as edges arrive. Each edge carries a
//! property set recording which facets of the target were observed;
//! re-adding an edge unions the properties instead of duplicating it.
//! Transitive reachability is memoized per vertex and the memo is
//! dropped on any structural mutation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Which facets of the target entity were observed over an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyProps {
    #[serde(default)]
    pub raw_content: bool,
    #[serde(default)]
    pub attributes: bool,
    #[serde(default)]
    pub compiled_content: bool,
    #[serde(default)]
    pub path: bool,
}

impl DependencyProps {
    pub fn raw_content() -> Self {
        DependencyProps {
            raw_content: true,
            ..Default::default()
        }
    }

    pub fn attributes() -> Self {
        DependencyProps {
            attributes: true,
            ..Default::default()
        }
    }

    pub fn compiled_content() -> Self {
        DependencyProps {
            compiled_content: true,
            ..Default::default()
        }
    }

    pub fn path() -> Self {
        DependencyProps {
            path: true,
            ..Default::default()
        }
    }

    pub fn union(self, other: DependencyProps) -> DependencyProps {
        DependencyProps {
            raw_content: self.raw_content || other.raw_content,
            attributes: self.attributes || other.attributes,
            compiled_content: self.compiled_content || other.compiled_content,
            path: self.path || other.path,
        }
    }

    /// No facet recorded; treated as "anything about the target".
    pub fn is_generic(&self) -> bool {
        !(self.raw_content || self.attributes || self.compiled_content || self.path)
    }
}

impl fmt::Display for DependencyProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_generic() {
            return f.write_str("*");
        }
        let mut facets = Vec::new();
        if self.raw_content {
            facets.push("raw_content");
        }
        if self.attributes {
            facets.push("attributes");
        }
        if self.compiled_content {
            facets.push("compiled_content");
        }
        if self.path {
            facets.push("path");
        }
        f.write_str(&facets.join(", "))
    }
}

#[derive(Debug)]
struct ClosureCache<V> {
    predecessors: HashMap<V, HashSet<V>>,
    successors: HashMap<V, HashSet<V>>,
}

impl<V> Default for ClosureCache<V> {
    fn default() -> Self {
        ClosureCache {
            predecessors: HashMap::new(),
            successors: HashMap::new(),
        }
    }
}

/// Serializable form: vertex list plus edges by vertex index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData<V> {
    pub vertices: Vec<V>,
    pub edges: Vec<(usize, usize, DependencyProps)>,
}

impl<V> Default for GraphData<V> {
    fn default() -> Self {
        GraphData {
            vertices: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// Directed graph with prop-annotated edges.
#[derive(Debug)]
pub struct DepGraph<V: Clone + Eq + Hash> {
    vertices: Vec<V>,
    outgoing: HashMap<V, HashMap<V, DependencyProps>>,
    incoming: HashMap<V, HashMap<V, DependencyProps>>,
    closure: RwLock<ClosureCache<V>>,
}

impl<V: Clone + Eq + Hash> Default for DepGraph<V> {
    fn default() -> Self {
        DepGraph::new()
    }
}

impl<V: Clone + Eq + Hash> DepGraph<V> {
    pub fn new() -> Self {
        DepGraph {
            vertices: Vec::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            closure: RwLock::new(ClosureCache::default()),
        }
    }

    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.vertices.iter()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn contains_vertex(&self, vertex: &V) -> bool {
        self.outgoing.contains_key(vertex)
    }

    pub fn add_vertex(&mut self, vertex: V) {
        if !self.outgoing.contains_key(&vertex) {
            self.vertices.push(vertex.clone());
            self.outgoing.insert(vertex.clone(), HashMap::new());
            self.incoming.insert(vertex, HashMap::new());
            self.invalidate_closure();
        }
    }

    /// Add an edge, creating missing vertices. Idempotent: an existing
    /// edge has the new props unioned in.
    pub fn add_edge(&mut self, from: &V, to: &V, props: DependencyProps) {
        self.add_vertex(from.clone());
        self.add_vertex(to.clone());

        let slot = self
            .outgoing
            .get_mut(from)
            .and_then(|m| m.get(to).copied())
            .unwrap_or_default();
        let merged = slot.union(props);

        if let Some(m) = self.outgoing.get_mut(from) {
            m.insert(to.clone(), merged);
        }
        if let Some(m) = self.incoming.get_mut(to) {
            m.insert(from.clone(), merged);
        }
        self.invalidate_closure();
    }

    pub fn delete_edge(&mut self, from: &V, to: &V) {
        let removed = self
            .outgoing
            .get_mut(from)
            .and_then(|m| m.remove(to))
            .is_some();
        if let Some(m) = self.incoming.get_mut(to) {
            m.remove(from);
        }
        if removed {
            self.invalidate_closure();
        }
    }

    /// Drop all outgoing edges of a vertex.
    pub fn delete_edges_from(&mut self, vertex: &V) {
        let targets: Vec<V> = self
            .outgoing
            .get(vertex)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        if targets.is_empty() {
            return;
        }
        for target in &targets {
            if let Some(m) = self.outgoing.get_mut(vertex) {
                m.remove(target);
            }
            if let Some(m) = self.incoming.get_mut(target) {
                m.remove(vertex);
            }
        }
        self.invalidate_closure();
    }

    pub fn delete_vertex(&mut self, vertex: &V) {
        if !self.contains_vertex(vertex) {
            return;
        }
        let out: Vec<V> = self.direct_successors_of(vertex);
        for target in &out {
            if let Some(m) = self.incoming.get_mut(target) {
                m.remove(vertex);
            }
        }
        let inc: Vec<V> = self.direct_predecessors_of(vertex);
        for source in &inc {
            if let Some(m) = self.outgoing.get_mut(source) {
                m.remove(vertex);
            }
        }
        self.outgoing.remove(vertex);
        self.incoming.remove(vertex);
        self.vertices.retain(|v| v != vertex);
        self.invalidate_closure();
    }

    pub fn edge_props(&self, from: &V, to: &V) -> Option<DependencyProps> {
        self.outgoing.get(from).and_then(|m| m.get(to).copied())
    }

    pub fn direct_successors_of(&self, vertex: &V) -> Vec<V> {
        self.outgoing
            .get(vertex)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn direct_predecessors_of(&self, vertex: &V) -> Vec<V> {
        self.incoming
            .get(vertex)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// All vertices reachable by following edges forward. Memoized.
    pub fn successors_of(&self, vertex: &V) -> HashSet<V> {
        if let Some(hit) = self.closure.read().successors.get(vertex) {
            return hit.clone();
        }
        let reached = self.reachable(vertex, &self.outgoing);
        self.closure
            .write()
            .successors
            .insert(vertex.clone(), reached.clone());
        reached
    }

    /// All vertices reachable by following edges backward. Memoized.
    pub fn predecessors_of(&self, vertex: &V) -> HashSet<V> {
        if let Some(hit) = self.closure.read().predecessors.get(vertex) {
            return hit.clone();
        }
        let reached = self.reachable(vertex, &self.incoming);
        self.closure
            .write()
            .predecessors
            .insert(vertex.clone(), reached.clone());
        reached
    }

    /// Vertices with no incoming edges.
    pub fn roots(&self) -> HashSet<V> {
        self.vertices
            .iter()
            .filter(|v| self.incoming.get(*v).map_or(true, HashMap::is_empty))
            .cloned()
            .collect()
    }

    /// Probe for any cycle, returning one as an ordered path
    /// `[a, b, .., a]`. Used for error reporting only.
    pub fn any_cycle(&self) -> Option<Vec<V>> {
        let mut visited: HashSet<&V> = HashSet::new();
        for start in &self.vertices {
            if visited.contains(start) {
                continue;
            }
            // Iterative DFS with an explicit path for reconstruction.
            let mut path: Vec<&V> = Vec::new();
            let mut on_path: HashSet<&V> = HashSet::new();
            let mut stack: Vec<(&V, Vec<&V>)> = vec![(
                start,
                self.outgoing
                    .get(start)
                    .map(|m| m.keys().collect())
                    .unwrap_or_default(),
            )];
            path.push(start);
            on_path.insert(start);
            visited.insert(start);

            while let Some((_, children)) = stack.last_mut() {
                match children.pop() {
                    Some(child) => {
                        if on_path.contains(child) {
                            let from = path.iter().position(|v| *v == child).unwrap_or(0);
                            let mut cycle: Vec<V> =
                                path[from..].iter().map(|v| (*v).clone()).collect();
                            cycle.push(child.clone());
                            return Some(cycle);
                        }
                        if visited.contains(child) {
                            continue;
                        }
                        visited.insert(child);
                        on_path.insert(child);
                        path.push(child);
                        stack.push((
                            child,
                            self.outgoing
                                .get(child)
                                .map(|m| m.keys().collect())
                                .unwrap_or_default(),
                        ));
                    }
                    None => {
                        stack.pop();
                        if let Some(done) = path.pop() {
                            on_path.remove(done);
                        }
                    }
                }
            }
        }
        None
    }

    fn reachable(&self, vertex: &V, adjacency: &HashMap<V, HashMap<V, DependencyProps>>) -> HashSet<V> {
        let mut reached = HashSet::new();
        let mut pending: Vec<&V> = adjacency
            .get(vertex)
            .map(|m| m.keys().collect())
            .unwrap_or_default();
        while let Some(next) = pending.pop() {
            if reached.insert(next.clone()) {
                if let Some(onward) = adjacency.get(next) {
                    pending.extend(onward.keys());
                }
            }
        }
        reached
    }

    fn invalidate_closure(&mut self) {
        let mut cache = self.closure.write();
        cache.predecessors.clear();
        cache.successors.clear();
    }

    pub fn to_data(&self) -> GraphData<V> {
        let index: HashMap<&V, usize> = self
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (v, i))
            .collect();
        let mut edges = Vec::new();
        for from in &self.vertices {
            if let Some(targets) = self.outgoing.get(from) {
                for (to, props) in targets {
                    edges.push((index[from], index[to], *props));
                }
            }
        }
        // Deterministic file contents across runs.
        edges.sort_by_key(|&(f, t, _)| (f, t));
        GraphData {
            vertices: self.vertices.clone(),
            edges,
        }
    }

    pub fn from_data(data: GraphData<V>) -> Self {
        let mut graph = DepGraph::new();
        for vertex in &data.vertices {
            graph.add_vertex(vertex.clone());
        }
        for (from, to, props) in data.edges {
            if let (Some(f), Some(t)) = (data.vertices.get(from), data.vertices.get(to)) {
                graph.add_edge(&f.clone(), &t.clone(), props);
            }
        }
        graph
    }
}
