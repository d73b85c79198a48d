//! External collaborators of a resolution run.
//!
//! The engine never touches the filesystem, git, or a test runner directly;
//! it programs against the four traits below. [`FsWorkspace`], [`GitCli`] and
//! [`ShellTestRunner`] are the production implementations and
//! [`MemoryWorkspace`] implements all four in memory.
//!
//! # Crate layout
//!
//! - [`fs`] — manifests, changelogs, and deferred scripts on disk.
//! - [`git`] — commit log, status, and commits through the `git` CLI.
//! - [`shell`] — test execution through `sh -c` with a time budget.
//! - [`memory`] — in-memory workspace that records every mutating call.

pub mod fs;
pub mod git;
pub mod memory;
pub mod shell;

use std::path::Path;

use serde::Serialize;

use crate::error::TandemError;
use crate::manifest::Manifest;
use crate::publish::DeferredAction;

pub use fs::FsWorkspace;
pub use git::GitCli;
pub use memory::MemoryWorkspace;
pub use shell::ShellTestRunner;

/// Locates and persists package manifests.
pub trait ManifestStore {
    /// Load the manifest of `name`; `Ok(None)` when no such package exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest exists but cannot be read.
    fn load_manifest(&self, name: &str) -> Result<Option<Manifest>, TandemError>;

    /// Persist `manifest` at its location.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Stage`] when the write fails.
    fn write_manifest(&self, manifest: &Manifest) -> Result<(), TandemError>;

    /// Add a changelog entry block for the package at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Stage`] when the write fails.
    fn append_changelog(&self, location: &Path, entry: &str) -> Result<(), TandemError>;
}

/// Source-control operations for one package directory.
pub trait VersionControl {
    /// Raw newest-first log text, optionally only commits after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::History`] when the log cannot be read.
    fn read_commit_log(&self, location: &Path, since: Option<&str>) -> Result<String, TandemError>;

    /// Short status text; any non-empty output means the tree is dirty.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::History`] when status cannot be read.
    fn working_tree_status(&self, location: &Path) -> Result<String, TandemError>;

    /// Commit every pending change with `message`.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Stage`] when the commit fails.
    fn record_version_commit(&self, location: &Path, message: &str) -> Result<(), TandemError>;
}

/// Outcome of one test execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Tail of the captured stderr, for reporting.
    pub output: String,
}

impl TestOutcome {
    #[must_use]
    pub fn passed() -> Self {
        Self {
            passed: true,
            exit_code: Some(0),
            timed_out: false,
            output: String::new(),
        }
    }

    #[must_use]
    pub fn failed(exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            passed: false,
            exit_code,
            timed_out: false,
            output: output.into(),
        }
    }

    /// One-line description of a failure.
    #[must_use]
    pub fn detail(&self) -> String {
        let head = if self.timed_out {
            "timed out".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            }
        };
        let tail = self.output.trim();
        if tail.is_empty() {
            head
        } else {
            format!("{head}: {tail}")
        }
    }
}

/// Runs a package's test suite.
pub trait TestRunner {
    /// Spawn failures are reported as failed outcomes, never as errors.
    fn run_tests(&self, manifest: &Manifest) -> TestOutcome;
}

/// Deferred and immediate release actions.
pub trait Publisher {
    /// Persist `action` for later execution by the operator.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Stage`] when the action cannot be written.
    fn stage_action(&self, manifest: &Manifest, action: &DeferredAction) -> Result<(), TandemError>;

    /// Publish the package at its manifest version now.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Stage`] when publishing fails.
    fn publish_package(&self, manifest: &Manifest) -> Result<(), TandemError>;
}

/// Bundle of collaborators handed to a run.
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub manifests: &'a dyn ManifestStore,
    pub vcs: &'a dyn VersionControl,
    pub tests: &'a dyn TestRunner,
    pub publisher: &'a dyn Publisher,
}

impl<'a> Environment<'a> {
    /// Use one value for every collaborator role.
    pub fn uniform<T>(all: &'a T) -> Self
    where
        T: ManifestStore + VersionControl + TestRunner + Publisher,
    {
        Self {
            manifests: all,
            vcs: all,
            tests: all,
            publisher: all,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_detail_mentions_cause() {
        assert_eq!(TestOutcome::failed(Some(2), "").detail(), "exit code 2");
        assert_eq!(
            TestOutcome::failed(Some(1), "  1 failing\n").detail(),
            "exit code 1: 1 failing"
        );
        let timed_out = TestOutcome {
            timed_out: true,
            ..TestOutcome::failed(None, "")
        };
        assert_eq!(timed_out.detail(), "timed out");
    }
}
