#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::path::PathBuf;
use tandem_core::config::resolve_config;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "tandem",
    author,
    version,
    about = "tandem: coordinated version bumps across interdependent packages",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format.
    #[arg(long, value_enum, global = true)]
    format: Option<OutputMode>,

    /// Workspace directory holding the packages.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Release",
        about = "Assign next versions to packages and their dependencies",
        long_about = "Resolve the dependency closure of the named packages, check that every \
                      package is clean and passes its tests, propagate version bumps to \
                      dependents and stage manifests, changelogs and release scripts.",
        after_help = "EXAMPLES:\n    # Version the package in the current directory\n    tandem version\n\n    # Preview a beta release of two packages\n    tandem version wind hydrocarbon --dry-run --channel beta\n\n    # Emit machine-readable output\n    tandem version wind --dry-run --json"
    )]
    Version(cmd::version::VersionArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the dependency closure of a package",
        long_about = "Resolve a package's managed dependency closure without running tests \
                      and show reference counts, versions and dependency cycles.",
        after_help = "EXAMPLES:\n    # Show the closure of a package\n    tandem graph wind\n\n    # Emit machine-readable output\n    tandem graph wind --json"
    )]
    Graph(cmd::graph::GraphArgs),

    #[command(
        next_help_heading = "Release",
        about = "Run pending release scripts",
        long_about = "Run the commit.bounty and publish.bounty scripts staged by `tandem version`.",
        after_help = "EXAMPLES:\n    # Publish every package with a pending release\n    tandem publish\n\n    # Publish one package\n    tandem publish wind"
    )]
    Publish(cmd::publish::PublishArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    tandem completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TANDEM_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tandem=debug,info"
        } else {
            "tandem=info,warn"
        })
    });

    let format = env::var("TANDEM_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable in JSON mode.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        debug!("Verbose mode enabled");
    }

    if let Commands::Completions(args) = &cli.command {
        return cmd::completions::run_completions(args.shell, &mut Cli::command());
    }

    let cwd = env::current_dir()?;
    let config = match resolve_config(cli.workspace.clone(), cli.json, &cwd) {
        Ok(config) => config,
        Err(err) => {
            let mode = cli.format.unwrap_or(if cli.json { OutputMode::Json } else { OutputMode::Text });
            render_error(mode, &CliError::from(&err))?;
            std::process::exit(1);
        }
    };
    let output = cli
        .format
        .unwrap_or_else(|| OutputMode::from_label(&config.resolved_output));
    debug!(workspace = %config.workspace.display(), ?output, "resolved config");

    let command_result = match &cli.command {
        Commands::Version(args) => cmd::version::run_version(args, &config, output, &cwd),
        Commands::Graph(args) => cmd::graph::run_graph(args, &config, output),
        Commands::Publish(args) => cmd::publish::run_publish(args, &config, output),
        Commands::Completions(_) => Ok(()),
    };

    if let Err(err) = command_result {
        render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn command_is_named_after_the_binary() {
        assert_eq!(Cli::command().get_name(), "tandem");
    }

    #[test]
    fn json_flag_after_subcommand() {
        let cli = Cli::parse_from(["tandem", "graph", "wind", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["tandem", "--format", "text", "version"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn version_subcommand_parses() {
        let cli = Cli::parse_from(["tandem", "version", "wind", "--dry-run", "--workspace", "/tmp/ws"]);
        match cli.command {
            Commands::Version(args) => {
                assert_eq!(args.names, ["wind"]);
                assert!(args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/ws")));
    }

    #[test]
    fn graph_requires_a_name() {
        assert!(Cli::try_parse_from(["tandem", "graph"]).is_err());
    }

    #[test]
    fn publish_and_completions_parse() {
        let cli = Cli::parse_from(["tandem", "publish", "wind", "css"]);
        assert!(matches!(cli.command, Commands::Publish(_)));
        let cli = Cli::parse_from(["tandem", "completions", "zsh"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Zsh,
            })
        ));
    }
}
