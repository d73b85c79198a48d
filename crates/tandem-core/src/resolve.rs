//! Per-package version resolution.
//!
//! Turns a manifest into a [`DependencyNode`]: reads the package's commit log
//! and working tree status once, classifies history up to the version
//! marker, and derives the node's [`VersionData`]. This is the only place
//! version data is derived from history; propagation later only forces bumps.

use std::collections::BTreeMap;

use tracing::info;

use crate::collab::VersionControl;
use crate::error::TandemError;
use crate::graph::{DependencyNode, TestStatus, VersionData};
use crate::history::{CommitClassifier, HistorySummary, MarkerPolicy, parse_log, scan};
use crate::manifest::Manifest;
use crate::version::{Channel, Version, latest};

/// Knobs of version resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Channel the next version is placed into.
    pub channel: Channel,
    /// Treat breaking changes as major bumps even before 1.0.
    pub release: bool,
    pub marker: MarkerPolicy,
    /// Package name → tracked baseline commit; history is read after it.
    pub baselines: BTreeMap<String, String>,
}

pub struct VersionResolver<'a> {
    policy: &'a ResolverPolicy,
    classifier: &'a dyn CommitClassifier,
    vcs: &'a dyn VersionControl,
}

impl<'a> VersionResolver<'a> {
    #[must_use]
    pub fn new(
        policy: &'a ResolverPolicy,
        classifier: &'a dyn CommitClassifier,
        vcs: &'a dyn VersionControl,
    ) -> Self {
        Self {
            policy,
            classifier,
            vcs,
        }
    }

    /// Build the node for `manifest`, reading its history and status.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::MalformedVersion`] for an unparsable manifest
    /// version and [`TandemError::History`] when the log or status cannot be
    /// read.
    pub fn create_node(&self, manifest: Manifest) -> Result<DependencyNode, TandemError> {
        let name = manifest.name.clone();
        let since = self.policy.baselines.get(&name).map(String::as_str);

        let raw = self.vcs.read_commit_log(&manifest.location, since)?;
        let mut commits = parse_log(&raw);
        let history = scan(
            &commits,
            &name,
            &manifest.version,
            self.classifier,
            self.policy.marker,
        );
        commits.truncate(history.commit_drift);

        let status = self.vcs.working_tree_status(&manifest.location)?;
        let dirty_paths: Vec<String> = status
            .lines()
            .filter_map(status_path)
            .map(str::to_string)
            .collect();

        let version_data = self.version_data(&manifest, &history)?;
        info!(
            package = %name,
            current = %version_data.current,
            next = %version_data.next,
            bump_required = version_data.bump_required,
            drift = history.commit_drift,
            "Determined next version"
        );

        Ok(DependencyNode {
            name,
            manifest,
            commits,
            history,
            dirty: !dirty_paths.is_empty(),
            dirty_paths,
            test_status: TestStatus::NotRun,
            processed: false,
            reference_count: 0,
            version_data,
        })
    }

    /// Derive version data from the declared version and a history summary.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::MalformedVersion`] naming the package when the
    /// declared version does not parse.
    pub fn version_data(
        &self,
        manifest: &Manifest,
        history: &HistorySummary,
    ) -> Result<VersionData, TandemError> {
        let current =
            Version::parse(&manifest.version).map_err(|e| e.for_package(&manifest.name))?;
        let recovered = history.recovered_version.clone();
        let baseline = latest(&current, &recovered).clone();
        let next = baseline
            .bump(history.breaking, history.feature, self.policy.release)
            .with_channel(self.policy.channel.clone());

        Ok(VersionData {
            current,
            recovered,
            baseline,
            next,
            bump_required: history.has_drift(),
        })
    }
}

/// The path of one `git status -s` line (`XY path`, or `XY old -> new` for
/// renames, where the new path is kept).
fn status_path(line: &str) -> Option<&str> {
    let entry = line.get(3..).unwrap_or_else(|| line.trim());
    let path = entry.rsplit(" -> ").next().unwrap_or(entry).trim();
    (!path.is_empty()).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryWorkspace;
    use crate::history::PrefixClassifier;

    fn resolve(ws: &MemoryWorkspace, policy: &ResolverPolicy, name: &str) -> DependencyNode {
        let resolver = VersionResolver::new(policy, &PrefixClassifier, ws);
        let manifest = ws.manifest(name).expect("registered");
        resolver.create_node(manifest).expect("resolve")
    }

    #[test]
    fn drift_requires_bump() {
        let ws = MemoryWorkspace::new();
        ws.add_package(Manifest::new("@x/a", "1.2.3", "/ignored"));
        ws.set_commits("@x/a", &["#feature add thing", "fix", "version @x/a to 1.2.3"]);

        let node = resolve(&ws, &ResolverPolicy::default(), "@x/a");
        assert!(node.version_data.bump_required);
        assert_eq!(node.history.commit_drift, 2);
        assert_eq!(node.version_data.baseline, Version::new(1, 2, 3));
        assert_eq!(node.version_data.next, Version::new(1, 3, 0));
        assert_eq!(node.commits.len(), 2);
        assert!(!node.dirty);
    }

    #[test]
    fn no_drift_keeps_baseline() {
        let ws = MemoryWorkspace::new();
        ws.add_package(Manifest::new("@x/a", "1.2.3", "/ignored"));
        ws.set_commits("@x/a", &["1.2.3", "#breaking old"]);

        let node = resolve(&ws, &ResolverPolicy::default(), "@x/a");
        assert!(!node.version_data.bump_required);
        assert_eq!(node.resolved_version(), &Version::new(1, 2, 3));
        assert!(node.commits.is_empty());
    }

    #[test]
    fn recovered_version_can_win_baseline() {
        let ws = MemoryWorkspace::new();
        ws.add_package(Manifest::new("@x/a", "0.1.0", "/ignored"));
        ws.set_commits("@x/a", &["fix", "v0.4.0"]);

        let node = resolve(&ws, &ResolverPolicy::default(), "@x/a");
        assert_eq!(node.version_data.recovered, Version::new(0, 4, 0));
        assert_eq!(node.version_data.baseline, Version::new(0, 4, 0));
        assert_eq!(node.version_data.next, Version::new(0, 4, 1));
    }

    #[test]
    fn channel_and_release_policy_apply_to_next() {
        let ws = MemoryWorkspace::new();
        ws.add_package(Manifest::new("@x/a", "0.3.0", "/ignored"));
        ws.set_commits("@x/a", &["#breaking rename"]);

        let policy = ResolverPolicy {
            channel: Channel::Beta,
            release: true,
            ..ResolverPolicy::default()
        };
        let node = resolve(&ws, &policy, "@x/a");
        assert_eq!(node.version_data.next.to_string(), "1.0.0-beta");
    }

    #[test]
    fn dirty_status_is_captured_once() {
        let ws = MemoryWorkspace::new();
        ws.add_package(Manifest::new("@x/a", "1.0.0", "/ignored"));
        ws.set_status("@x/a", " M src/lib.ts\n?? notes.md\n");

        let node = resolve(&ws, &ResolverPolicy::default(), "@x/a");
        assert!(node.dirty);
        assert_eq!(node.dirty_paths, ["src/lib.ts", "notes.md"]);
    }

    #[test]
    fn status_lines_become_paths() {
        assert_eq!(status_path(" M src/lib.ts"), Some("src/lib.ts"));
        assert_eq!(status_path("?? notes.md"), Some("notes.md"));
        assert_eq!(status_path("R  old.ts -> new.ts"), Some("new.ts"));
        assert_eq!(status_path("   "), None);
    }

    #[test]
    fn malformed_manifest_version_names_package() {
        let ws = MemoryWorkspace::new();
        ws.add_package(Manifest::new("@x/a", "1.0", "/ignored"));
        let policy = ResolverPolicy::default();
        let resolver = VersionResolver::new(&policy, &PrefixClassifier, &ws);
        let err = resolver
            .create_node(ws.manifest("@x/a").expect("registered"))
            .expect_err("malformed");
        assert!(matches!(
            err,
            TandemError::MalformedVersion { package: Some(ref p), .. } if p == "@x/a"
        ));
    }

    #[test]
    fn baseline_commit_bounds_the_log() {
        let ws = MemoryWorkspace::new();
        ws.add_package(Manifest::new("@x/a", "1.0.0", "/ignored"));
        ws.set_commits("@x/a", &["#feature newest", "#breaking older"]);

        let mut baselines = BTreeMap::new();
        baselines.insert("@x/a".to_string(), format!("{:040x}", 1));
        let policy = ResolverPolicy {
            baselines,
            ..ResolverPolicy::default()
        };
        let node = resolve(&ws, &policy, "@x/a");
        assert_eq!(node.version_data.next, Version::new(1, 1, 0));
    }
}
