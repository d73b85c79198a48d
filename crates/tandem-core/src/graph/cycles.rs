//! Dependency cycle diagnostics.
//!
//! Cycles are legal in a package graph and never abort a run; they are only
//! reported. Each strongly connected component with more than one package,
//! or a single package depending on itself, is one cycle.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use super::DependencyGraph;

/// Project the package graph onto a petgraph `DiGraph`.
///
/// An edge `A → B` means "A depends on B".
#[must_use]
pub fn to_digraph(graph: &DependencyGraph) -> DiGraph<String, ()> {
    let mut digraph = DiGraph::<String, ()>::with_capacity(graph.len(), graph.len());
    let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(graph.len());

    for name in graph.names() {
        index.insert(name, digraph.add_node(name.to_string()));
    }
    for (dependent, dependency) in graph.edges() {
        if let (Some(&from), Some(&to)) = (index.get(dependent), index.get(dependency)) {
            digraph.update_edge(from, to, ());
        }
    }
    digraph
}

/// Find every dependency cycle in `graph`.
///
/// Each entry is the sorted list of package names in one cycle; entries are
/// sorted as well, so the result is deterministic.
#[must_use]
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let digraph = to_digraph(graph);

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&digraph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|node| digraph.contains_edge(*node, *node))
        })
        .map(|component| {
            let mut names: Vec<String> = component
                .into_iter()
                .map(|idx| digraph[idx].clone())
                .collect();
            names.sort_unstable();
            names
        })
        .collect();

    cycles.sort_unstable();
    cycles
}
