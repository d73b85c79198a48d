//! Newest-to-oldest classification scan.

use serde::Serialize;
use tracing::debug;

use super::CommitRecord;
use super::classify::CommitClassifier;
use super::marker::{MarkerPolicy, recover_version};
use crate::version::{Channel, Version};

/// Version assumed when no marker commit records one.
#[must_use]
pub fn default_recovered_version() -> Version {
    Version::new(0, 0, 0).with_channel(Channel::Experimental)
}

/// Changelog-marked commit found during the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangelogCommit {
    pub commit: CommitRecord,
    pub breaking: bool,
}

/// Result of scanning a package's commit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    /// A breaking change was seen above the marker.
    pub breaking: bool,
    /// A feature was seen above the marker.
    pub feature: bool,
    /// Commits scanned before the marker (all commits when there is none).
    pub commit_drift: usize,
    /// Version recorded by the marker commit, or `0.0.0-experimental`.
    pub recovered_version: Version,
    /// Hash of the marker commit, if one was found.
    pub marker: Option<String>,
    /// Changelog-marked commits above the marker, newest first.
    pub changelog: Vec<ChangelogCommit>,
}

impl Default for HistorySummary {
    fn default() -> Self {
        Self {
            breaking: false,
            feature: false,
            commit_drift: 0,
            recovered_version: default_recovered_version(),
            marker: None,
            changelog: Vec::new(),
        }
    }
}

impl HistorySummary {
    /// Something changed since the last recorded version.
    #[must_use]
    pub const fn has_drift(&self) -> bool {
        self.commit_drift > 0
    }
}

/// Classify `commits` (newest first) until the first version-marker commit.
pub fn scan(
    commits: &[CommitRecord],
    package: &str,
    declared_version: &str,
    classifier: &dyn CommitClassifier,
    policy: MarkerPolicy,
) -> HistorySummary {
    let mut summary = HistorySummary::default();

    for commit in commits {
        if policy.is_marker(&commit.message, package, declared_version) {
            match recover_version(&commit.message) {
                Some(version) => summary.recovered_version = version,
                None => debug!(
                    package,
                    hash = %commit.hash,
                    "marker commit carries no parsable version"
                ),
            }
            summary.marker = Some(commit.hash.clone());
            break;
        }

        let flags = classifier.classify(&commit.message);
        summary.breaking |= flags.breaking;
        summary.feature |= flags.feature;
        if flags.changelog {
            summary.changelog.push(ChangelogCommit {
                commit: commit.clone(),
                breaking: flags.breaking,
            });
        }
        summary.commit_drift += 1;
    }

    summary
}
