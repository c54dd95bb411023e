// src/graph.rs

//! Package dependency graph and installation ordering
//!
//! Nodes are package names; an edge (A -> B) records that A declares a
//! dependency on B. Cycles are expected input (real dependency sets contain
//! them) and are tolerated everywhere: ordering appends the unorderable
//! remainder instead of failing. Insertion order is retained so that every
//! run over the same store produces the same installation order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use tracing::warn;

/// A node in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
    pub name: String,
    pub version: String,
    pub artifact: PathBuf,
}

/// Dependency graph built from artifact metadata
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, PackageNode>,
    /// Node names in first-insertion order; the ordering tie-break
    order: Vec<String>,
    /// Declared dependencies per node, deduplicated, in declaration order
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package node; re-adding a name keeps the first node
    pub fn add_node(&mut self, node: PackageNode) {
        if !self.nodes.contains_key(&node.name) {
            self.order.push(node.name.clone());
            self.nodes.insert(node.name.clone(), node);
        }
    }

    /// Record that `from` declares a dependency on `to`
    ///
    /// Self-references are ignored and duplicate declarations collapse to a
    /// single edge.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let deps = self.edges.entry(from.to_string()).or_default();
        if !deps.iter().any(|d| d == to) {
            deps.push(to.to_string());
        }
    }

    pub fn node(&self, name: &str) -> Option<&PackageNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All edges between known nodes, in insertion/declaration order
    pub fn edge_list(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for name in &self.order {
            if let Some(deps) = self.edges.get(name) {
                for dep in deps {
                    if self.nodes.contains_key(dep) {
                        edges.push((name.clone(), dep.clone()));
                    }
                }
            }
        }
        edges
    }

    /// Compute the installation order: dependencies before dependents
    ///
    /// Kahn's algorithm over the edges whose endpoints are both known nodes.
    /// A dependency cycle cannot be strictly ordered; nodes stuck behind one
    /// are placed by a depth-first pass that still puts dependencies first,
    /// so only edges inside a cycle can end up inverted, with insertion
    /// order breaking the remaining ties. Dependencies on packages absent
    /// from the graph do not constrain the order.
    pub fn installation_order(&self) -> Vec<String> {
        // Unmet-dependency count per node, counting only in-graph deps
        let mut pending: HashMap<&str, usize> = HashMap::new();
        // dep -> dependents, in insertion order
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for name in &self.order {
            let deps: Vec<&str> = self
                .edges
                .get(name)
                .map(|deps| {
                    deps.iter()
                        .filter(|d| self.nodes.contains_key(*d))
                        .map(String::as_str)
                        .collect()
                })
                .unwrap_or_default();

            pending.insert(name, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(name);
            }
        }

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|name| pending[name] == 0)
            .collect();

        let mut ordered: Vec<String> = Vec::with_capacity(self.order.len());
        let mut emitted: HashSet<&str> = HashSet::new();

        while let Some(name) = queue.pop_front() {
            ordered.push(name.to_string());
            emitted.insert(name);

            if let Some(deps) = dependents.get(name) {
                for &dependent in deps {
                    if let Some(count) = pending.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if ordered.len() != self.order.len() {
            let remainder: Vec<&str> = self
                .order
                .iter()
                .map(String::as_str)
                .filter(|name| !emitted.contains(*name))
                .collect();
            warn!(
                "Dependency cycle among [{}]; placing dependencies first where possible",
                remainder.join(", ")
            );
            let mut visiting: HashSet<&str> = HashSet::new();
            for name in remainder {
                self.place_stuck(name, &mut emitted, &mut visiting, &mut ordered);
            }
        }

        ordered
    }

    /// Emit a stuck node after its unemitted in-graph dependencies
    ///
    /// Post-order walk; a back-edge to a node already on the stack is the
    /// cycle itself and is the only edge the final order may invert.
    fn place_stuck<'g>(
        &'g self,
        name: &'g str,
        emitted: &mut HashSet<&'g str>,
        visiting: &mut HashSet<&'g str>,
        ordered: &mut Vec<String>,
    ) {
        if emitted.contains(name) || !visiting.insert(name) {
            return;
        }
        if let Some(deps) = self.edges.get(name) {
            for dep in deps {
                if self.nodes.contains_key(dep) {
                    self.place_stuck(dep, emitted, visiting, ordered);
                }
            }
        }
        visiting.remove(name);
        emitted.insert(name);
        ordered.push(name.to_string());
    }
}
