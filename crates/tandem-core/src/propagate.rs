//! Fixpoint propagation of version bumps across the graph.
//!
//! # Rule
//!
//! For every node `D` and every dependency `k` of `D` that is a graph node:
//!
//! - if `k` requires a bump and `D` does not, `D` is forced to bump;
//! - if `k`'s resolved version differs from the version `D` declares for it,
//!   `D` is forced to bump and its declaration is rewritten (keeping the
//!   range operator).
//!
//! Full scans repeat until one scan mutates nothing.
//!
//! # Termination
//!
//! A forced bump only happens on the transition of `bump_required` from
//! false to true, so every node changes its resolved version at most once.
//! A declaration is only rewritten after its dependency's resolved version
//! changed. Both counts are bounded by the node and edge counts.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::graph::DependencyGraph;
use crate::version::{Part, Version, rewrite_constraint, split_constraint};

/// How far a forced bump raises a node's next version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationPolicy {
    pub forced_bump: Part,
}

impl Default for PropagationPolicy {
    fn default() -> Self {
        Self {
            forced_bump: Part::Patch,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    /// Full scans that mutated the graph. The final scan that finds nothing
    /// to change is not counted.
    pub scans: usize,
    /// Individual (node, dependency) mutations.
    pub mutations: usize,
    /// Nodes whose bump was forced by a dependency, in the order forced.
    pub forced: Vec<String>,
}

struct Edge {
    name: String,
    resolved: Version,
    bump_required: bool,
}

/// Run propagation to a fixpoint.
#[instrument(skip(graph), fields(nodes = graph.len()))]
pub fn propagate(graph: &mut DependencyGraph, policy: PropagationPolicy) -> PropagationReport {
    let order = scan_order(graph);
    let mut report = PropagationReport::default();

    loop {
        let mut changed = false;

        for name in &order {
            let edges = edges_of(graph, name);
            let Some(node) = graph.get_mut(name) else {
                continue;
            };

            for edge in edges {
                let Some(declared) = node.manifest.dependencies.get(&edge.name) else {
                    continue;
                };
                let (_, declared_version) = split_constraint(declared);
                let stale = Version::parse(declared_version).ok().as_ref() != Some(&edge.resolved);
                let forced = edge.bump_required && !node.version_data.bump_required;
                if !stale && !forced {
                    continue;
                }

                if !node.version_data.bump_required {
                    let data = &mut node.version_data;
                    data.bump_required = true;
                    let candidate = data
                        .baseline
                        .increment(policy.forced_bump)
                        .with_channel(data.next.channel.clone());
                    if candidate > data.next {
                        data.next = candidate;
                    }
                    debug!(
                        package = %node.name,
                        dependency = %edge.name,
                        next = %data.next,
                        "bump forced by dependency"
                    );
                    report.forced.push(node.name.clone());
                }

                if stale {
                    // A self-dependency follows the version just forced.
                    let target = if edge.name == node.name {
                        node.resolved_version().clone()
                    } else {
                        edge.resolved
                    };
                    if let Some(declared) = node.manifest.dependencies.get_mut(&edge.name) {
                        let rewritten = rewrite_constraint(declared, &target);
                        debug!(
                            package = %node.name,
                            dependency = %edge.name,
                            from = %declared,
                            to = %rewritten,
                            "rewriting dependency"
                        );
                        *declared = rewritten;
                    }
                }

                report.mutations += 1;
                changed = true;
            }
        }

        if !changed {
            break;
        }
        report.scans += 1;
    }

    debug!(
        scans = report.scans,
        mutations = report.mutations,
        "propagation stable"
    );
    report
}

/// Discovery order, then any node the discovery order does not list.
fn scan_order(graph: &DependencyGraph) -> Vec<String> {
    let mut order = graph.discovery_order().to_vec();
    for name in graph.names() {
        if !order.iter().any(|n| n == name) {
            order.push(name.to_string());
        }
    }
    order
}

fn edges_of(graph: &DependencyGraph, name: &str) -> Vec<Edge> {
    let Some(node) = graph.get(name) else {
        return Vec::new();
    };
    node.manifest
        .dependencies
        .keys()
        .filter_map(|dep| graph.get(dep))
        .map(|dep| Edge {
            name: dep.name.clone(),
            resolved: dep.resolved_version().clone(),
            bump_required: dep.version_data.bump_required,
        })
        .collect()
}
