//! Release staging.
//!
//! [`stage`] turns the stable graph into one [`StagedRelease`] per package
//! that requires a bump: the rewritten manifest, an optional changelog entry
//! and the follow-up actions (record the version, publish). [`materialize`]
//! persists them through the collaborators, either as deferred scripts or
//! by performing the actions immediately. Simulated runs stage but never
//! materialize.

pub mod script;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collab::Environment;
use crate::error::TandemError;
use crate::graph::DependencyGraph;
use crate::history::changelog;
use crate::manifest::Manifest;
use crate::version::Version;

/// A follow-up action produced by staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeferredAction {
    /// Commit every pending change of the package with `message`.
    RecordVersion { message: String },
    /// Publish the package at `version`.
    Publish { version: Version },
}

/// How staged actions are carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionMode {
    /// Write executable scripts for the operator to run later.
    #[default]
    Deferred,
    /// Commit and publish right away.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedRelease {
    pub package: String,
    pub version: Version,
    /// Manifest as it will be written: new version and dependency entries.
    pub manifest: Manifest,
    pub changelog: Option<String>,
    pub actions: Vec<DeferredAction>,
}

/// Commit message recording a version assignment.
///
/// Its shape is what the default marker policy recognizes on the next run.
#[must_use]
pub fn version_message(package: &str, version: &Version) -> String {
    format!("version {package} to {version}")
}

/// Stage a release for every bump-required node, dependencies first.
#[must_use]
pub fn stage(graph: &DependencyGraph, today: NaiveDate) -> Vec<StagedRelease> {
    graph
        .discovery_order()
        .iter()
        .filter_map(|name| graph.get(name))
        .filter(|node| node.version_data.bump_required)
        .map(|node| {
            let version = node.version_data.next.clone();
            let mut manifest = node.manifest.clone();
            manifest.version = version.to_string();

            StagedRelease {
                package: node.name.clone(),
                changelog: changelog::entry(&version, &node.history.changelog, today),
                actions: vec![
                    DeferredAction::RecordVersion {
                        message: version_message(&node.name, &version),
                    },
                    DeferredAction::Publish {
                        version: version.clone(),
                    },
                ],
                version,
                manifest,
            }
        })
        .collect()
}

/// Persist staged releases through the collaborators.
///
/// # Errors
///
/// Returns the first collaborator failure; releases staged before it stay
/// persisted.
pub fn materialize(
    staged: &[StagedRelease],
    mode: ActionMode,
    env: Environment<'_>,
) -> Result<(), TandemError> {
    for release in staged {
        let location = &release.manifest.location;
        env.manifests.write_manifest(&release.manifest)?;
        if let Some(entry) = &release.changelog {
            env.manifests.append_changelog(location, entry)?;
        }

        for action in &release.actions {
            match (mode, action) {
                (ActionMode::Deferred, _) => env.publisher.stage_action(&release.manifest, action)?,
                (ActionMode::Immediate, DeferredAction::RecordVersion { message }) => {
                    env.vcs.record_version_commit(location, message)?;
                }
                (ActionMode::Immediate, DeferredAction::Publish { .. }) => {
                    env.publisher.publish_package(&release.manifest)?;
                }
            }
        }

        info!(
            package = %release.package,
            version = %release.version,
            mode = ?mode,
            "staged release"
        );
    }
    Ok(())
}
