//! `tandem publish` — run the deferred scripts left by `tandem version`.

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};
use tandem_core::collab::FsWorkspace;
use tandem_core::config::EffectiveConfig;
use tandem_core::publish::script::{COMMIT_SCRIPT, PUBLISH_SCRIPT};
use tracing::{info, warn};

use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct PublishArgs {
    /// Packages to publish. Defaults to every package in the workspace.
    pub names: Vec<String>,
}

/// Outcome for one package.
#[derive(Debug, Default, Serialize)]
pub struct PublishStep {
    pub package: String,
    /// `commit.bounty` was pending and ran successfully.
    pub committed: bool,
    /// `publish.bounty` ran successfully.
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct PublishReport {
    pub steps: Vec<PublishStep>,
}

impl PublishReport {
    fn failed(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }
}

// ─── public API ─────────────────────────────────────────────────────────────

/// Run pending scripts of every package in `names`.
///
/// A pending `commit.bounty` runs first so the version is recorded before
/// it is published. Packages without a pending `publish.bounty` are skipped.
/// A failure in one package does not stop the others.
pub fn publish_pending(workspace: &FsWorkspace, names: &[String]) -> PublishReport {
    let mut report = PublishReport::default();

    for name in names {
        let Some(publish) = workspace.pending_script(name, PUBLISH_SCRIPT) else {
            continue;
        };
        let mut step = PublishStep {
            package: name.clone(),
            ..PublishStep::default()
        };

        if let Some(commit) = workspace.pending_script(name, COMMIT_SCRIPT) {
            match run_script(&commit) {
                Ok(()) => step.committed = true,
                Err(e) => {
                    warn!(package = %name, %e, "version commit script failed");
                    step.error = Some(format!("{COMMIT_SCRIPT}: {e}"));
                    report.steps.push(step);
                    continue;
                }
            }
        }

        match run_script(&publish) {
            Ok(()) => {
                info!(package = %name, "published");
                step.published = true;
            }
            Err(e) => {
                warn!(package = %name, %e, "publish script failed");
                step.error = Some(format!("{PUBLISH_SCRIPT}: {e}"));
            }
        }
        report.steps.push(step);
    }

    report
}

/// Execute `tandem publish`.
pub fn run_publish(args: &PublishArgs, config: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let workspace = config.project.fs_workspace(&config.workspace);
    let names = if args.names.is_empty() {
        workspace
            .package_names()
            .with_context(|| format!("listing packages in {}", config.workspace.display()))?
    } else {
        let namespace = config.project.namespace();
        args.names.iter().map(|n| namespace.qualify(n)).collect()
    };

    let report = publish_pending(&workspace, &names);
    render_mode(output, &report, render_publish_human, render_publish_human)?;

    let failed = report.failed();
    if failed > 0 {
        anyhow::bail!("{failed} package(s) failed to publish");
    }
    Ok(())
}

// ─── helpers ────────────────────────────────────────────────────────────────

fn run_script(script: &Path) -> Result<()> {
    let dir = script
        .parent()
        .with_context(|| format!("script {} has no parent directory", script.display()))?;
    let output = Command::new("sh")
        .arg(script)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to spawn sh {}", script.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("exited with {}: {}", output.status, stderr.trim());
    }
    Ok(())
}

fn render_publish_human(report: &PublishReport, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    if report.steps.is_empty() {
        writeln!(w, "Nothing to publish.")?;
        return Ok(());
    }
    pretty_section(w, "Publish")?;
    for step in &report.steps {
        match &step.error {
            Some(error) => writeln!(w, "✗ {}: {error}", step.package)?,
            None if step.committed => writeln!(w, "✓ {} (committed, published)", step.package)?,
            None => writeln!(w, "✓ {}", step.package)?,
        }
    }
    Ok(())
}
