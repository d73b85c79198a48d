//! In-memory workspace.
//!
//! Holds manifests, commit logs, status text and scripted test outcomes per
//! package, and records every collaborator call in order. Mutating calls
//! update the in-memory state, so a run against a `MemoryWorkspace` can be
//! inspected afterwards exactly like a run against disk.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{ManifestStore, Publisher, TestOutcome, TestRunner, VersionControl};
use crate::error::TandemError;
use crate::manifest::Manifest;
use crate::publish::DeferredAction;

/// A collaborator call observed by [`MemoryWorkspace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    LoadManifest(String),
    ReadCommitLog(PathBuf),
    WorkingTreeStatus(PathBuf),
    RunTests(String),
    WriteManifest(String),
    AppendChangelog(PathBuf),
    RecordVersionCommit(PathBuf, String),
    StageAction(String, DeferredAction),
    PublishPackage(String),
}

impl Call {
    /// Calls that persist something outside the run.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::WriteManifest(_)
                | Self::AppendChangelog(_)
                | Self::RecordVersionCommit(..)
                | Self::StageAction(..)
                | Self::PublishPackage(_)
        )
    }
}

#[derive(Debug, Default)]
struct State {
    manifests: BTreeMap<String, Manifest>,
    logs: BTreeMap<PathBuf, String>,
    statuses: BTreeMap<PathBuf, String>,
    outcomes: BTreeMap<String, TestOutcome>,
    changelogs: BTreeMap<PathBuf, String>,
    calls: Vec<Call>,
}

#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    state: RefCell<State>,
}

impl MemoryWorkspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conventional location of `name` inside the in-memory workspace.
    #[must_use]
    pub fn location_of(name: &str) -> PathBuf {
        PathBuf::from("/memory").join(name.trim_start_matches('@'))
    }

    /// Register a package. Its location is rewritten to [`Self::location_of`].
    pub fn add_package(&self, mut manifest: Manifest) -> &Self {
        manifest.location = Self::location_of(&manifest.name);
        self.state
            .borrow_mut()
            .manifests
            .insert(manifest.name.clone(), manifest);
        self
    }

    /// Set the commit log of `name` from newest-first messages.
    pub fn set_commits(&self, name: &str, messages: &[&str]) -> &Self {
        self.state
            .borrow_mut()
            .logs
            .insert(Self::location_of(name), synthetic_log(messages));
        self
    }

    pub fn set_status(&self, name: &str, status: &str) -> &Self {
        self.state
            .borrow_mut()
            .statuses
            .insert(Self::location_of(name), status.to_string());
        self
    }

    pub fn set_test_outcome(&self, name: &str, outcome: TestOutcome) -> &Self {
        self.state
            .borrow_mut()
            .outcomes
            .insert(name.to_string(), outcome);
        self
    }

    /// Current manifest of `name`, including any rewrite made by a run.
    #[must_use]
    pub fn manifest(&self, name: &str) -> Option<Manifest> {
        self.state.borrow().manifests.get(name).cloned()
    }

    /// Changelog text accumulated for `name`.
    #[must_use]
    pub fn changelog(&self, name: &str) -> Option<String> {
        self.state
            .borrow()
            .changelogs
            .get(&Self::location_of(name))
            .cloned()
    }

    /// Every call observed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Number of observed calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn package_at(&self, location: &Path) -> Option<String> {
        self.state
            .borrow()
            .manifests
            .values()
            .find(|m| m.location == location)
            .map(|m| m.name.clone())
    }
}

/// Render newest-first commit messages as `git log --no-decorate` text.
#[must_use]
pub fn synthetic_log(messages: &[&str]) -> String {
    let mut out = String::new();
    for (i, message) in messages.iter().enumerate() {
        out.push_str(&format!(
            "commit {:040x}\nAuthor: Tandem Test <test@example.com>\nDate:   Mon Oct 12 09:30:00 2026 +0200\n\n",
            messages.len() - i
        ));
        for line in message.lines() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

impl ManifestStore for MemoryWorkspace {
    fn load_manifest(&self, name: &str) -> Result<Option<Manifest>, TandemError> {
        self.record(Call::LoadManifest(name.to_string()));
        Ok(self.manifest(name))
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), TandemError> {
        self.record(Call::WriteManifest(manifest.name.clone()));
        self.state
            .borrow_mut()
            .manifests
            .insert(manifest.name.clone(), manifest.clone());
        Ok(())
    }

    fn append_changelog(&self, location: &Path, entry: &str) -> Result<(), TandemError> {
        self.record(Call::AppendChangelog(location.to_path_buf()));
        let mut state = self.state.borrow_mut();
        let existing = state.changelogs.remove(location).unwrap_or_default();
        state
            .changelogs
            .insert(location.to_path_buf(), format!("{entry}\n{existing}"));
        Ok(())
    }
}

impl VersionControl for MemoryWorkspace {
    fn read_commit_log(&self, location: &Path, since: Option<&str>) -> Result<String, TandemError> {
        self.record(Call::ReadCommitLog(location.to_path_buf()));
        let log = self
            .state
            .borrow()
            .logs
            .get(location)
            .cloned()
            .unwrap_or_default();

        let Some(since) = since else {
            return Ok(log);
        };
        // Keep only the commits above `since`.
        let cut = log.find(&format!("commit {since}")).unwrap_or(log.len());
        Ok(log[..cut].to_string())
    }

    fn working_tree_status(&self, location: &Path) -> Result<String, TandemError> {
        self.record(Call::WorkingTreeStatus(location.to_path_buf()));
        Ok(self
            .state
            .borrow()
            .statuses
            .get(location)
            .cloned()
            .unwrap_or_default())
    }

    fn record_version_commit(&self, location: &Path, message: &str) -> Result<(), TandemError> {
        self.record(Call::RecordVersionCommit(
            location.to_path_buf(),
            message.to_string(),
        ));
        let mut state = self.state.borrow_mut();
        let previous = state.logs.remove(location).unwrap_or_default();
        let mut log = synthetic_log(&[message]);
        log.push_str(&previous);
        state.logs.insert(location.to_path_buf(), log);
        state.statuses.remove(location);
        Ok(())
    }
}

impl TestRunner for MemoryWorkspace {
    fn run_tests(&self, manifest: &Manifest) -> TestOutcome {
        self.record(Call::RunTests(manifest.name.clone()));
        self.state
            .borrow()
            .outcomes
            .get(&manifest.name)
            .cloned()
            .unwrap_or_else(TestOutcome::passed)
    }
}

impl Publisher for MemoryWorkspace {
    fn stage_action(&self, manifest: &Manifest, action: &DeferredAction) -> Result<(), TandemError> {
        self.record(Call::StageAction(manifest.name.clone(), action.clone()));
        Ok(())
    }

    fn publish_package(&self, manifest: &Manifest) -> Result<(), TandemError> {
        let name = self
            .package_at(&manifest.location)
            .unwrap_or_else(|| manifest.name.clone());
        self.record(Call::PublishPackage(name));
        Ok(())
    }
}
