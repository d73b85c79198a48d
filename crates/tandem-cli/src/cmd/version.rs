//! `tandem version` — resolve, gate, propagate and stage releases.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tandem_core::collab::{Environment, FsWorkspace, GitCli, ShellTestRunner};
use tandem_core::config::EffectiveConfig;
use tandem_core::graph::Namespace;
use tandem_core::publish::ActionMode;
use tandem_core::run::{Eligibility, RunOptions, RunReport, resolve_and_version};
use tandem_core::{Channel, Version};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `tandem version`.
#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Packages to version. The namespace prefix may be omitted. Defaults to
    /// the package in the current directory.
    pub names: Vec<String>,

    /// Report what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Release channel for the new versions (`release`, `beta`, `experimental`, ...).
    #[arg(long)]
    pub channel: Option<String>,

    /// Record and publish right away instead of writing deferred scripts.
    #[arg(long)]
    pub immediate: bool,
}

/// Qualified root names: the given names, or the package in `cwd`.
pub fn root_names(names: &[String], namespace: &Namespace, cwd: &Path) -> Result<Vec<String>> {
    if names.is_empty() {
        let manifest = FsWorkspace::manifest_at(cwd).with_context(|| {
            format!(
                "no package in {}; name the packages to version",
                cwd.display()
            )
        })?;
        return Ok(vec![manifest.name]);
    }
    Ok(names.iter().map(|name| namespace.qualify(name)).collect())
}

pub fn options(args: &VersionArgs, config: &EffectiveConfig) -> RunOptions {
    let mut options = RunOptions::from_config(&config.project, &config.workspace).simulate(args.dry_run);
    if let Some(channel) = &args.channel {
        options.resolver.channel = Channel::from_label(channel);
    }
    if args.immediate {
        options.actions = ActionMode::Immediate;
    }
    options
}

/// Execute `tandem version`.
pub fn run_version(
    args: &VersionArgs,
    config: &EffectiveConfig,
    output: OutputMode,
    cwd: &Path,
) -> Result<()> {
    let roots = root_names(&args.names, &config.project.namespace(), cwd)?;
    let workspace = config.project.fs_workspace(&config.workspace);
    let runner = ShellTestRunner::new(config.project.test_timeout());
    let env = Environment {
        manifests: &workspace,
        vcs: &GitCli,
        tests: &runner,
        publisher: &workspace,
    };

    let report = resolve_and_version(&roots, &options(args, config), env)
        .with_context(|| format!("versioning {}", roots.join(", ")))?;

    render_mode(output, &report, render_version_text, render_version_pretty)
}

fn eligibility_label(eligibility: &Eligibility) -> String {
    match eligibility {
        Eligibility::Eligible => "ok".to_string(),
        Eligibility::Unchecked => "unchecked".to_string(),
        Eligibility::Ineligible { reason } => format!("not eligible ({})", reason.code()),
    }
}

fn change(current: &Version, next: &Version, bump: bool) -> String {
    if bump {
        format!("{current} -> {next}")
    } else {
        format!("{current} (unchanged)")
    }
}

fn render_version_text(report: &RunReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "package  current  next  bump  eligibility")?;
    for name in &report.discovery_order {
        let Some(p) = report.package(name) else {
            continue;
        };
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            p.name,
            p.current,
            p.resolved(),
            p.bump_required,
            eligibility_label(&p.eligibility)
        )?;
    }
    Ok(())
}

fn render_version_pretty(report: &RunReport, w: &mut dyn Write) -> std::io::Result<()> {
    let heading = if report.simulate {
        "Version plan (dry run)"
    } else {
        "Versioned packages"
    };
    pretty_section(w, heading)?;

    for name in &report.discovery_order {
        let Some(p) = report.package(name) else {
            continue;
        };
        pretty_kv(w, &p.name, change(&p.current, &p.next, p.bump_required))?;
        if let Eligibility::Ineligible { reason } = &p.eligibility {
            writeln!(w, "             ! {}", reason.to_string().replace('\n', "\n               "))?;
        }
    }

    for cycle in &report.cycles {
        writeln!(w, "\ncycle: {}", cycle.join(" -> "))?;
    }

    writeln!(w)?;
    if report.staged.is_empty() {
        writeln!(w, "Nothing to release.")?;
    } else if report.materialized {
        writeln!(w, "Staged {} release(s).", report.staged.len())?;
    } else {
        writeln!(w, "{} release(s) would be staged.", report.staged.len())?;
    }
    Ok(())
}
