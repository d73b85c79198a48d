//! Run-scoped dependency graph.
//!
//! The graph is an arena of [`DependencyNode`]s keyed by package name. It is
//! built once per run by [`GraphBuilder`], checked by the eligibility pass,
//! and then mutated in place by propagation. Nothing in it outlives the run.
//!
//! ## Submodules
//!
//! - [`build`] — closure discovery with reference counting.
//! - [`cycles`] — strongly connected components, reported as cycles.

pub mod build;
pub mod cycles;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::history::{CommitRecord, HistorySummary};
use crate::manifest::Manifest;
use crate::version::Version;

pub use build::{GraphBuilder, Namespace, PackageFilter};
pub use cycles::find_cycles;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Test execution state of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    NotRun,
    Passed,
    Failed,
}

/// Version decision attached to a node at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionData {
    /// Version declared by the manifest.
    pub current: Version,
    /// Version recovered from the last marker commit.
    pub recovered: Version,
    /// The greater of `current` and `recovered`.
    pub baseline: Version,
    pub next: Version,
    pub bump_required: bool,
}

impl VersionData {
    /// The version dependents should declare: `next` when a bump is
    /// required, `baseline` otherwise.
    #[must_use]
    pub const fn resolved(&self) -> &Version {
        if self.bump_required {
            &self.next
        } else {
            &self.baseline
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub name: String,
    pub manifest: Manifest,
    /// Commits above the version marker, newest first.
    pub commits: Vec<CommitRecord>,
    pub history: HistorySummary,
    pub dirty: bool,
    /// Short status lines captured when `dirty` was computed.
    pub dirty_paths: Vec<String>,
    pub test_status: TestStatus,
    /// Set once every dependency of this node has been visited.
    pub processed: bool,
    /// Number of distinct graph nodes that declare a dependency on this one.
    pub reference_count: usize,
    pub version_data: VersionData,
}

impl DependencyNode {
    #[must_use]
    pub const fn resolved_version(&self) -> &Version {
        self.version_data.resolved()
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, DependencyNode>,
    discovery: Vec<String>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DependencyNode> {
        self.nodes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DependencyNode> {
        self.nodes.get_mut(name)
    }

    /// Insert `node` unless its name is already present.
    ///
    /// Returns `false` (leaving the existing node untouched) on a duplicate.
    pub fn insert(&mut self, node: DependencyNode) -> bool {
        if self.nodes.contains_key(&node.name) {
            return false;
        }
        self.nodes.insert(node.name.clone(), node);
        true
    }

    /// Nodes in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Names in the order their closures finished, dependencies first.
    #[must_use]
    pub fn discovery_order(&self) -> &[String] {
        &self.discovery
    }

    /// Dependency edges `(dependent, dependency)` between nodes of this graph.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes.values().flat_map(move |node| {
            node.manifest
                .dependencies
                .keys()
                .filter(|dep| self.nodes.contains_key(*dep))
                .map(move |dep| (node.name.as_str(), dep.as_str()))
        })
    }

    /// Mark `name` processed and append it to the discovery order.
    pub(crate) fn finish(&mut self, name: &str) {
        if let Some(node) = self.nodes.get_mut(name) {
            if !node.processed {
                node.processed = true;
                self.discovery.push(name.to_string());
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{bumped, graph, node};
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut g = DependencyGraph::new();
        assert!(g.insert(node("a", "1.0.0", &[])));
        let mut again = node("a", "9.9.9", &[]);
        again.reference_count = 7;
        assert!(!g.insert(again));
        assert_eq!(g.len(), 1);
        assert_eq!(g.get("a").map(|n| n.reference_count), Some(0));
    }

    #[test]
    fn resolved_version_follows_bump_flag() {
        let plain = node("a", "1.0.0", &[]);
        assert_eq!(plain.resolved_version(), &Version::new(1, 0, 0));
        let bumped = bumped("b", "1.0.0", "1.1.0", &[]);
        assert_eq!(bumped.resolved_version(), &Version::new(1, 1, 0));
    }

    #[test]
    fn edges_ignore_external_dependencies() {
        let g = graph(vec![
            node("a", "1.0.0", &[("b", "^1.0.0"), ("left-pad", "1.0.0")]),
            node("b", "1.0.0", &[("a", "1.0.0")]),
        ]);
        let edges: Vec<_> = g.edges().collect();
        assert_eq!(edges, vec![("a", "b"), ("b", "a")]);
    }

    #[test]
    fn finish_records_discovery_once() {
        let mut g = DependencyGraph::new();
        let mut n = node("a", "1.0.0", &[]);
        n.processed = false;
        g.insert(n);
        g.finish("a");
        g.finish("a");
        assert_eq!(g.discovery_order(), ["a".to_string()]);
        assert!(g.get("a").is_some_and(|n| n.processed));
    }
}
