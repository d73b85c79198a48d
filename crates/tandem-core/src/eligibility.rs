//! Eligibility gate: clean working tree, then passing tests.

use tracing::{debug, warn};

use crate::collab::TestRunner;
use crate::error::Ineligibility;
use crate::graph::{DependencyGraph, DependencyNode, TestStatus};

/// Check one node. Returns `None` when it may be versioned.
///
/// A dirty node is rejected without running its tests. Tests run at most
/// once per node; a later check reuses the recorded [`TestStatus`].
pub fn validate_node(node: &mut DependencyNode, tests: &dyn TestRunner) -> Option<Ineligibility> {
    if node.dirty {
        return Some(Ineligibility::DirtyWorkingTree {
            package: node.name.clone(),
            paths: node.dirty_paths.clone(),
        });
    }

    match node.test_status {
        TestStatus::Passed => None,
        TestStatus::Failed => Some(Ineligibility::TestFailure {
            package: node.name.clone(),
            detail: "tests failed earlier in this run".to_string(),
        }),
        TestStatus::NotRun => {
            debug!(package = %node.name, "running tests");
            let outcome = tests.run_tests(&node.manifest);
            if outcome.passed {
                node.test_status = TestStatus::Passed;
                None
            } else {
                node.test_status = TestStatus::Failed;
                Some(Ineligibility::TestFailure {
                    package: node.name.clone(),
                    detail: outcome.detail(),
                })
            }
        }
    }
}

/// Check every node in discovery order and collect all failures.
pub fn validate_graph(graph: &mut DependencyGraph, tests: &dyn TestRunner) -> Vec<Ineligibility> {
    let order = graph.discovery_order().to_vec();
    let mut failures = Vec::new();

    for name in order {
        let Some(node) = graph.get_mut(&name) else {
            continue;
        };
        if let Some(failure) = validate_node(node, tests) {
            warn!(package = %name, code = %failure.code(), "{failure}");
            failures.push(failure);
        }
    }

    failures
}
