//! Source control through the `git` command line.
//!
//! Every operation is scoped to the package directory (`-- .`), so packages
//! sharing one repository only see their own history and changes.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::VersionControl;
use crate::error::TandemError;

#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    fn run(location: &Path, args: &[&str]) -> Result<String, String> {
        debug!(dir = %location.display(), ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(location)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| format!("failed to spawn git: {e}"))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn history_error(location: &Path, message: String) -> TandemError {
    TandemError::History {
        package: location.display().to_string(),
        message,
    }
}

impl VersionControl for GitCli {
    fn read_commit_log(&self, location: &Path, since: Option<&str>) -> Result<String, TandemError> {
        let range = since.map(|commit| format!("{commit}..HEAD"));
        let mut args = vec!["log", "--no-decorate"];
        if let Some(range) = &range {
            args.push(range.as_str());
        }
        args.extend(["--", "."]);

        match Self::run(location, &args) {
            Ok(log) => Ok(log),
            // A fresh repository has no history yet.
            Err(stderr) if stderr.contains("does not have any commits") => Ok(String::new()),
            Err(stderr) => Err(history_error(location, stderr)),
        }
    }

    fn working_tree_status(&self, location: &Path) -> Result<String, TandemError> {
        Self::run(location, &["status", "-s", "--", "."]).map_err(|e| history_error(location, e))
    }

    fn record_version_commit(&self, location: &Path, message: &str) -> Result<(), TandemError> {
        let stage_error = |message: String| TandemError::Stage {
            package: location.display().to_string(),
            what: "version commit",
            message,
        };
        Self::run(location, &["add", "-A", "--", "."]).map_err(stage_error)?;
        Self::run(location, &["commit", "-m", message]).map_err(stage_error)?;
        Ok(())
    }
}
