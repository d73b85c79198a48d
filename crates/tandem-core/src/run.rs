//! Resolution run entry point.
//!
//! # Phases
//!
//! ```text
//! roots ──► GraphBuilder (VersionResolver per new node)
//!        ──► cycle diagnostics
//!        ──► eligibility (dirty tree, tests)        ── not eligible & !simulate ──► Err(NotEligible)
//!        ──► propagation to a fixpoint
//!        ──► staging ──► materialize (skipped when simulating)
//! ```
//!
//! Every phase works on one run-scoped [`DependencyGraph`]; the graph is
//! fully built before eligibility and propagation start.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::collab::Environment;
use crate::config::ProjectConfig;
use crate::eligibility::validate_graph;
use crate::error::{Ineligibility, TandemError};
use crate::graph::{DependencyGraph, DependencyNode, GraphBuilder, Namespace, TestStatus, find_cycles};
use crate::history::{CommitClassifier, PrefixClassifier};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, RUN_LOCK_PATH, RunLock};
use crate::propagate::{PropagationPolicy, PropagationReport, propagate};
use crate::publish::{ActionMode, StagedRelease, materialize, stage};
use crate::resolve::{ResolverPolicy, VersionResolver};
use crate::version::Version;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Managed package namespace.
    pub namespace: Namespace,
    /// Report what would happen without persisting anything.
    pub simulate: bool,
    /// Run the dirty-tree and test gate. Disabled for graph inspection.
    pub check_eligibility: bool,
    pub resolver: ResolverPolicy,
    pub propagation: PropagationPolicy,
    pub actions: ActionMode,
    /// Date stamped on changelog entries; the local date when unset.
    pub today: Option<NaiveDate>,
    /// Workspace lock taken by non-simulated runs.
    pub lock_path: Option<PathBuf>,
    pub lock_timeout: Duration,
}

impl RunOptions {
    #[must_use]
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            simulate: false,
            check_eligibility: true,
            resolver: ResolverPolicy::default(),
            propagation: PropagationPolicy::default(),
            actions: ActionMode::default(),
            today: None,
            lock_path: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Options for the workspace at `root` as configured by `config`.
    #[must_use]
    pub fn from_config(config: &ProjectConfig, root: &std::path::Path) -> Self {
        Self {
            resolver: config.resolver_policy(),
            propagation: config.propagation_policy(),
            actions: config.publish.actions,
            lock_path: Some(root.join(RUN_LOCK_PATH)),
            ..Self::new(config.namespace())
        }
    }

    #[must_use]
    pub const fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Eligibility of one package in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    Ineligible { reason: Ineligibility },
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageReport {
    pub name: String,
    pub current: Version,
    pub baseline: Version,
    pub next: Version,
    pub bump_required: bool,
    pub reference_count: usize,
    pub commit_drift: usize,
    pub test_status: TestStatus,
    pub eligibility: Eligibility,
}

impl PackageReport {
    fn from_node(node: &DependencyNode, eligibility: Eligibility) -> Self {
        let data = &node.version_data;
        Self {
            name: node.name.clone(),
            current: data.current.clone(),
            baseline: data.baseline.clone(),
            next: data.next.clone(),
            bump_required: data.bump_required,
            reference_count: node.reference_count,
            commit_drift: node.history.commit_drift,
            test_status: node.test_status,
            eligibility,
        }
    }

    /// The version dependents end up declaring.
    #[must_use]
    pub const fn resolved(&self) -> &Version {
        if self.bump_required {
            &self.next
        } else {
            &self.baseline
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub simulate: bool,
    pub packages: BTreeMap<String, PackageReport>,
    /// Package names, dependencies first.
    pub discovery_order: Vec<String>,
    pub cycles: Vec<Vec<String>>,
    pub propagation: PropagationReport,
    pub staged: Vec<StagedRelease>,
    /// Whether staged releases were persisted.
    pub materialized: bool,
}

impl RunReport {
    #[must_use]
    pub fn package(&self, name: &str) -> Option<&PackageReport> {
        self.packages.get(name)
    }

    /// Every ineligibility found, in discovery order.
    #[must_use]
    pub fn failures(&self) -> Vec<&Ineligibility> {
        self.discovery_order
            .iter()
            .filter_map(|name| self.packages.get(name))
            .filter_map(|p| match &p.eligibility {
                Eligibility::Ineligible { reason } => Some(reason),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.failures().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Resolve `roots`, gate, propagate and stage with the default classifier.
///
/// # Errors
///
/// See [`resolve_and_version_with`].
pub fn resolve_and_version(
    roots: &[String],
    options: &RunOptions,
    env: Environment<'_>,
) -> Result<RunReport, TandemError> {
    resolve_and_version_with(roots, options, env, &PrefixClassifier)
}

/// Resolve `roots` into one graph, gate it, propagate to a fixpoint and
/// stage the resulting releases.
///
/// # Errors
///
/// - [`TandemError::UnresolvedDependency`] / [`TandemError::MalformedVersion`]
///   and collaborator read failures abort graph construction.
/// - [`TandemError::NotEligible`] carries every ineligibility of a
///   non-simulated run.
/// - [`TandemError::Lock`] when another run holds the workspace lock.
/// - [`TandemError::Stage`] when persisting a staged release fails.
#[instrument(skip(options, env, classifier), fields(simulate = options.simulate))]
pub fn resolve_and_version_with(
    roots: &[String],
    options: &RunOptions,
    env: Environment<'_>,
    classifier: &dyn CommitClassifier,
) -> Result<RunReport, TandemError> {
    let _lock = match (&options.lock_path, options.simulate) {
        (Some(path), false) => Some(RunLock::acquire(path, options.lock_timeout)?),
        _ => None,
    };

    let resolver = VersionResolver::new(&options.resolver, classifier, env.vcs);
    let builder = GraphBuilder::new(env.manifests, &resolver, &options.namespace);
    let mut graph = DependencyGraph::new();
    for root in roots {
        builder.add_root(root, &mut graph, &mut |node, so_far| {
            debug!(package = %node.name, discovered = so_far.len(), "package resolved");
        })?;
    }

    let cycles = find_cycles(&graph);
    for cycle in &cycles {
        warn!(packages = %cycle.join(" -> "), "dependency cycle");
    }

    let failures = if options.check_eligibility {
        validate_graph(&mut graph, env.tests)
    } else {
        Vec::new()
    };
    if !failures.is_empty() && !options.simulate {
        return Err(TandemError::NotEligible { failures });
    }

    let propagation = propagate(&mut graph, options.propagation);
    let today = options.today.unwrap_or_else(|| Local::now().date_naive());
    let staged = stage(&graph, today);

    let materialized = !options.simulate && !staged.is_empty();
    if materialized {
        materialize(&staged, options.actions, env)?;
    }
    info!(
        packages = graph.len(),
        releases = staged.len(),
        materialized,
        "run complete"
    );

    Ok(report(&graph, options, failures, cycles, propagation, staged, materialized))
}

fn report(
    graph: &DependencyGraph,
    options: &RunOptions,
    failures: Vec<Ineligibility>,
    cycles: Vec<Vec<String>>,
    propagation: PropagationReport,
    staged: Vec<StagedRelease>,
    materialized: bool,
) -> RunReport {
    let mut reasons: BTreeMap<String, Ineligibility> = failures
        .into_iter()
        .map(|f| (f.package().to_string(), f))
        .collect();

    let packages = graph
        .nodes()
        .map(|node| {
            let eligibility = match reasons.remove(&node.name) {
                Some(reason) => Eligibility::Ineligible { reason },
                None if options.check_eligibility => Eligibility::Eligible,
                None => Eligibility::Unchecked,
            };
            (node.name.clone(), PackageReport::from_node(node, eligibility))
        })
        .collect();

    RunReport {
        simulate: options.simulate,
        packages,
        discovery_order: graph.discovery_order().to_vec(),
        cycles,
        propagation,
        staged,
        materialized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryWorkspace;
    use crate::collab::memory::Call;
    use crate::manifest::Manifest;

    fn options() -> RunOptions {
        RunOptions {
            today: NaiveDate::from_ymd_opt(2026, 10, 19),
            ..RunOptions::new(Namespace::new("@x/"))
        }
    }

    fn roots(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn sample() -> MemoryWorkspace {
        let ws = MemoryWorkspace::new();
        ws.add_package(Manifest::new("@x/app", "1.0.0", "/ignored").with_dependency("@x/lib", "^1.0.5"));
        ws.add_package(Manifest::new("@x/lib", "1.0.5", "/ignored"));
        ws.set_commits("@x/app", &["version @x/app to 1.0.0"]);
        ws.set_commits("@x/lib", &["#feature faster parse", "version @x/lib to 1.0.5"]);
        ws
    }

    #[test]
    fn real_run_propagates_and_materializes() {
        let ws = sample();
        let report = resolve_and_version(&roots(&["@x/app"]), &options(), Environment::uniform(&ws))
            .expect("run");

        assert!(report.materialized);
        assert!(report.is_eligible());
        assert_eq!(report.discovery_order, ["@x/lib", "@x/app"]);
        let lib = report.package("@x/lib").expect("lib");
        assert_eq!(lib.next, Version::new(1, 1, 0));
        let app = report.package("@x/app").expect("app");
        assert!(app.bump_required);
        assert_eq!(app.next, Version::new(1, 0, 1));

        let written = ws.manifest("@x/app").expect("app manifest");
        assert_eq!(written.version, "1.0.1");
        assert_eq!(written.dependencies["@x/lib"], "^1.1.0");
        assert_eq!(ws.count(|c| matches!(c, Call::StageAction(..))), 4);
    }

    #[test]
    fn simulation_matches_real_run_without_mutation() {
        let simulated_ws = sample();
        let simulated = resolve_and_version(
            &roots(&["@x/app"]),
            &options().simulate(true),
            Environment::uniform(&simulated_ws),
        )
        .expect("simulated run");
        let real_ws = sample();
        let real = resolve_and_version(&roots(&["@x/app"]), &options(), Environment::uniform(&real_ws))
            .expect("real run");

        assert!(!simulated.materialized);
        assert_eq!(simulated_ws.count(Call::is_mutation), 0);
        for (name, package) in &real.packages {
            let sim = simulated.package(name).expect("same packages");
            assert_eq!(sim.next, package.next);
            assert_eq!(sim.bump_required, package.bump_required);
        }
        assert_eq!(simulated.staged.len(), real.staged.len());
    }

    #[test]
    fn ineligible_real_run_fails_with_every_issue() {
        let ws = sample();
        ws.set_status("@x/app", "?? scratch.txt");
        ws.set_test_outcome("@x/lib", crate::collab::TestOutcome::failed(Some(1), ""));

        let err = resolve_and_version(&roots(&["@x/app"]), &options(), Environment::uniform(&ws))
            .expect_err("not eligible");
        let TandemError::NotEligible { failures } = err else {
            panic!("expected NotEligible, got {err:?}");
        };
        let packages: Vec<_> = failures.iter().map(Ineligibility::package).collect();
        assert_eq!(packages, ["@x/lib", "@x/app"]);
        assert_eq!(ws.count(Call::is_mutation), 0);
    }

    #[test]
    fn simulated_run_reports_ineligibility() {
        let ws = sample();
        ws.set_status("@x/lib", " M src/index.ts");
        let report = resolve_and_version(
            &roots(&["@x/app"]),
            &options().simulate(true),
            Environment::uniform(&ws),
        )
        .expect("simulated run completes");

        assert!(!report.is_eligible());
        assert!(matches!(
            report.package("@x/lib").map(|p| &p.eligibility),
            Some(Eligibility::Ineligible { .. })
        ));
        assert_eq!(report.package("@x/app").map(|p| &p.eligibility), Some(&Eligibility::Eligible));
        assert!(report.package("@x/app").is_some_and(|p| p.bump_required));
    }

    #[test]
    fn graph_inspection_skips_tests() {
        let ws = sample();
        let opts = RunOptions {
            check_eligibility: false,
            ..options().simulate(true)
        };
        let report = resolve_and_version(&roots(&["@x/app"]), &opts, Environment::uniform(&ws))
            .expect("run");
        assert_eq!(ws.count(|c| matches!(c, Call::RunTests(_))), 0);
        assert!(report
            .packages
            .values()
            .all(|p| p.eligibility == Eligibility::Unchecked));
    }

    #[test]
    fn report_serializes_to_json() {
        let ws = sample();
        let report = resolve_and_version(
            &roots(&["@x/app"]),
            &options().simulate(true),
            Environment::uniform(&ws),
        )
        .expect("run");
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["packages"]["@x/lib"]["next"], "1.1.0");
        assert_eq!(json["packages"]["@x/app"]["eligibility"]["status"], "eligible");
        assert_eq!(json["staged"][0]["actions"][0]["action"], "record_version");
    }
}
