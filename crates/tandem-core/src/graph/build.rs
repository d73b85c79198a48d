//! Dependency closure discovery.
//!
//! # Traversal
//!
//! Depth-first over managed dependency edges with an explicit stack. A
//! dependency seen for the first time is loaded, resolved into a node
//! (reference count 1) and descended into. A dependency already in the graph
//! only gains a reference, which is what keeps diamonds and cycles finite:
//! every package is resolved exactly once per run.
//!
//! A node is finished (marked processed, appended to the discovery order and
//! handed to the caller's callback) after all of its own edges are explored,
//! so callbacks arrive dependencies-first.

#![allow(clippy::module_name_repetitions)]

use tracing::{debug, instrument};

use super::{DependencyGraph, DependencyNode};
use crate::collab::ManifestStore;
use crate::error::TandemError;
use crate::manifest::Manifest;
use crate::resolve::VersionResolver;

/// Decides which declared dependencies belong to the managed graph.
pub trait PackageFilter {
    fn is_managed(&self, name: &str) -> bool;
}

impl<F> PackageFilter for F
where
    F: Fn(&str) -> bool,
{
    fn is_managed(&self, name: &str) -> bool {
        self(name)
    }
}

/// Packages whose name starts with a namespace prefix such as `@candlelib/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(pub String);

impl Namespace {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self(prefix.to_string())
    }

    /// Prefix `name` with the namespace unless it already carries it.
    #[must_use]
    pub fn qualify(&self, name: &str) -> String {
        if name.starts_with(&self.0) {
            name.to_string()
        } else {
            format!("{}{name}", self.0)
        }
    }

    /// `name` without the namespace prefix.
    #[must_use]
    pub fn strip<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.0.as_str()).unwrap_or(name)
    }
}

impl PackageFilter for Namespace {
    fn is_managed(&self, name: &str) -> bool {
        name.starts_with(&self.0)
    }
}

struct Frame {
    name: String,
    pending: std::vec::IntoIter<String>,
}

pub struct GraphBuilder<'a> {
    store: &'a dyn ManifestStore,
    resolver: &'a VersionResolver<'a>,
    filter: &'a dyn PackageFilter,
}

impl<'a> GraphBuilder<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn ManifestStore,
        resolver: &'a VersionResolver<'a>,
        filter: &'a dyn PackageFilter,
    ) -> Self {
        Self {
            store,
            resolver,
            filter,
        }
    }

    /// Resolve `root` and its closure into `graph`.
    ///
    /// `on_node` is called once per newly finished node with the graph built
    /// so far. Adding a root that is already in the graph changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::UnresolvedDependency`] when a root or declared
    /// dependency cannot be loaded, or any error raised while resolving a
    /// node's version data.
    #[instrument(skip(self, graph, on_node))]
    pub fn add_root(
        &self,
        root: &str,
        graph: &mut DependencyGraph,
        on_node: &mut dyn FnMut(&DependencyNode, &DependencyGraph),
    ) -> Result<(), TandemError> {
        if graph.contains(root) {
            debug!(root, "root already in graph");
            return Ok(());
        }

        let node = self.discover(root, None)?;
        let mut stack = vec![self.frame(&node)];
        graph.insert(node);

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let next = frame.pending.next();
            let dependent = frame.name.clone();

            match next {
                Some(dep) => {
                    if let Some(existing) = graph.get_mut(&dep) {
                        existing.reference_count += 1;
                        debug!(
                            dependency = %dep,
                            dependent = %dependent,
                            references = existing.reference_count,
                            "dependency already resolved"
                        );
                        continue;
                    }

                    let mut node = self.discover(&dep, Some(&dependent))?;
                    node.reference_count = 1;
                    stack.push(self.frame(&node));
                    graph.insert(node);
                }
                None => {
                    stack.pop();
                    graph.finish(&dependent);
                    if let Some(node) = graph.get(&dependent) {
                        on_node(node, graph);
                    }
                }
            }
        }

        Ok(())
    }

    /// Convenience wrapper: resolve `root` into a fresh graph.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_root`].
    pub fn resolve(&self, root: &str) -> Result<DependencyGraph, TandemError> {
        let mut graph = DependencyGraph::new();
        self.add_root(root, &mut graph, &mut |_, _| {})?;
        Ok(graph)
    }

    fn discover(&self, name: &str, required_by: Option<&str>) -> Result<DependencyNode, TandemError> {
        let manifest = self
            .store
            .load_manifest(name)?
            .ok_or_else(|| TandemError::UnresolvedDependency {
                name: name.to_string(),
                required_by: required_by.map(str::to_string),
            })?;
        debug!(package = name, location = %manifest.location.display(), "discovered package");
        self.resolver.create_node(manifest)
    }

    fn frame(&self, node: &DependencyNode) -> Frame {
        Frame {
            name: node.name.clone(),
            pending: self.managed_dependencies(&node.manifest).into_iter(),
        }
    }

    fn managed_dependencies(&self, manifest: &Manifest) -> Vec<String> {
        manifest
            .dependencies
            .keys()
            .filter(|name| self.filter.is_managed(name))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryWorkspace;
    use crate::history::PrefixClassifier;
    use crate::resolve::ResolverPolicy;

    fn workspace(packages: &[(&str, &[&str])]) -> MemoryWorkspace {
        let ws = MemoryWorkspace::new();
        for (name, deps) in packages {
            let mut manifest = Manifest::new(name, "1.0.0", "/ignored");
            for dep in *deps {
                manifest = manifest.with_dependency(dep, "1.0.0");
            }
            ws.add_package(manifest);
        }
        ws
    }

    fn build(ws: &MemoryWorkspace, roots: &[&str]) -> Result<(DependencyGraph, Vec<String>), TandemError> {
        let policy = ResolverPolicy::default();
        let resolver = VersionResolver::new(&policy, &PrefixClassifier, ws);
        let filter = Namespace::new("@x/");
        let builder = GraphBuilder::new(ws, &resolver, &filter);
        let mut graph = DependencyGraph::new();
        let mut seen = Vec::new();
        for root in roots {
            builder.add_root(root, &mut graph, &mut |node, _| seen.push(node.name.clone()))?;
        }
        Ok((graph, seen))
    }

    #[test]
    fn diamond_counts_distinct_dependents() {
        let ws = workspace(&[
            ("@x/app", &["@x/left", "@x/right"]),
            ("@x/left", &["@x/base"]),
            ("@x/right", &["@x/base"]),
            ("@x/base", &[]),
        ]);
        let (graph, seen) = build(&ws, &["@x/app"]).expect("build");
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.get("@x/base").map(|n| n.reference_count), Some(2));
        assert_eq!(graph.get("@x/app").map(|n| n.reference_count), Some(0));
        assert_eq!(seen, ["@x/base", "@x/left", "@x/right", "@x/app"]);
        assert_eq!(graph.discovery_order(), seen.as_slice());
        assert!(graph.nodes().all(|n| n.processed));
    }

    #[test]
    fn cycle_is_finite() {
        let ws = workspace(&[("@x/a", &["@x/b"]), ("@x/b", &["@x/a"])]);
        let (graph, seen) = build(&ws, &["@x/a"]).expect("build");
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("@x/a").map(|n| n.reference_count), Some(1));
        assert_eq!(graph.get("@x/b").map(|n| n.reference_count), Some(1));
        assert_eq!(seen, ["@x/b", "@x/a"]);
    }

    #[test]
    fn repeated_root_adds_nothing() {
        let ws = workspace(&[("@x/a", &["@x/b"]), ("@x/b", &[])]);
        let (graph, seen) = build(&ws, &["@x/a", "@x/a", "@x/b"]).expect("build");
        assert_eq!(graph.len(), 2);
        assert_eq!(seen.len(), 2);
        assert_eq!(graph.get("@x/b").map(|n| n.reference_count), Some(1));
    }

    #[test]
    fn unmanaged_dependencies_are_ignored() {
        let ws = workspace(&[("@x/a", &["left-pad"])]);
        let (graph, _) = build(&ws, &["@x/a"]).expect("build");
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn missing_dependency_names_dependent() {
        let ws = workspace(&[("@x/a", &["@x/ghost"])]);
        let err = build(&ws, &["@x/a"]).expect_err("dangling edge");
        assert!(matches!(
            err,
            TandemError::UnresolvedDependency { ref name, required_by: Some(ref by) }
                if name == "@x/ghost" && by == "@x/a"
        ));
    }

    #[test]
    fn namespace_qualifies_and_strips() {
        let ns = Namespace::new("@candlelib/");
        assert_eq!(ns.qualify("wick"), "@candlelib/wick");
        assert_eq!(ns.qualify("@candlelib/wick"), "@candlelib/wick");
        assert_eq!(ns.strip("@candlelib/wick"), "wick");
        assert!(ns.is_managed("@candlelib/uri"));
        assert!(!ns.is_managed("left-pad"));
    }
}
