//! `tandem graph` — show the resolved dependency closure of a package.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tandem_core::collab::{Environment, GitCli, ShellTestRunner};
use tandem_core::config::EffectiveConfig;
use tandem_core::run::{RunOptions, RunReport, resolve_and_version};

use crate::output::{OutputMode, pretty_section, render_mode};

/// Arguments for `tandem graph`.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Root package; the namespace prefix may be omitted.
    pub name: String,
}

#[derive(Debug, Serialize)]
struct GraphEntry {
    name: String,
    references: usize,
    current: String,
    next: String,
    bump_required: bool,
    commit_drift: usize,
}

#[derive(Debug, Serialize)]
struct GraphOutput {
    root: String,
    packages: Vec<GraphEntry>,
    cycles: Vec<Vec<String>>,
}

impl GraphOutput {
    fn from_report(root: String, report: &RunReport) -> Self {
        let packages = report
            .discovery_order
            .iter()
            .filter_map(|name| report.package(name))
            .map(|p| GraphEntry {
                name: p.name.clone(),
                references: p.reference_count,
                current: p.current.to_string(),
                next: p.resolved().to_string(),
                bump_required: p.bump_required,
                commit_drift: p.commit_drift,
            })
            .collect();
        Self {
            root,
            packages,
            cycles: report.cycles.clone(),
        }
    }
}

/// Execute `tandem graph`. Runs no tests and writes nothing.
pub fn run_graph(args: &GraphArgs, config: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let root = config.project.namespace().qualify(&args.name);
    let workspace = config.project.fs_workspace(&config.workspace);
    let runner = ShellTestRunner::default();
    let env = Environment {
        manifests: &workspace,
        vcs: &GitCli,
        tests: &runner,
        publisher: &workspace,
    };
    let options = RunOptions {
        check_eligibility: false,
        ..RunOptions::from_config(&config.project, &config.workspace).simulate(true)
    };

    let report = resolve_and_version(std::slice::from_ref(&root), &options, env)
        .with_context(|| format!("resolving {root}"))?;
    let payload = GraphOutput::from_report(root, &report);

    render_mode(output, &payload, render_graph_text, render_graph_pretty)
}

fn render_graph_text(payload: &GraphOutput, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "package  refs  current  next  drift")?;
    for p in &payload.packages {
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            p.name, p.references, p.current, p.next, p.commit_drift
        )?;
    }
    for cycle in &payload.cycles {
        writeln!(w, "cycle  {}", cycle.join(" "))?;
    }
    Ok(())
}

fn render_graph_pretty(payload: &GraphOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Dependency closure of {}", payload.root))?;
    for p in &payload.packages {
        let marker = if p.bump_required { "*" } else { " " };
        writeln!(
            w,
            "{marker} {:<32} {:>3} refs  {} -> {}",
            p.name, p.references, p.current, p.next
        )?;
    }

    if payload.cycles.is_empty() {
        writeln!(w, "\nNo dependency cycles found.")?;
    } else {
        writeln!(w, "\nDependency cycles ({})", payload.cycles.len())?;
        for (idx, cycle) in payload.cycles.iter().enumerate() {
            writeln!(w, "  {}. {}", idx + 1, cycle.join(" -> "))?;
        }
    }
    Ok(())
}
