use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collab::FsWorkspace;
use crate::collab::fs::{DEFAULT_CHANGELOG_FILE, DEFAULT_PUBLISH_COMMAND, MANIFEST_FILE};
use crate::error::TandemError;
use crate::graph::Namespace;
use crate::history::MarkerPolicy;
use crate::propagate::PropagationPolicy;
use crate::publish::ActionMode;
use crate::resolve::ResolverPolicy;
use crate::version::{Channel, Part};

pub const PROJECT_CONFIG_PATH: &str = ".tandem/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub packages: PackagesConfig,
    #[serde(default)]
    pub versioning: VersioningConfig,
    #[serde(default)]
    pub testing: TestingConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagesConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningConfig {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub release: bool,
    #[serde(default)]
    pub marker: MarkerPolicy,
    #[serde(default = "default_forced_bump")]
    pub forced_bump: Part,
    #[serde(default)]
    pub baselines: BTreeMap<String, String>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            release: false,
            marker: MarkerPolicy::default(),
            forced_bump: default_forced_bump(),
            baselines: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestingConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_command")]
    pub command: String,
    #[serde(default)]
    pub actions: ActionMode,
    #[serde(default = "default_changelog")]
    pub changelog: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            command: default_publish_command(),
            actions: ActionMode::default(),
            changelog: default_changelog(),
        }
    }
}

impl ProjectConfig {
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.packages.namespace)
    }

    #[must_use]
    pub fn resolver_policy(&self) -> ResolverPolicy {
        ResolverPolicy {
            channel: Channel::from_label(&self.versioning.channel),
            release: self.versioning.release,
            marker: self.versioning.marker,
            baselines: self.versioning.baselines.clone(),
        }
    }

    #[must_use]
    pub const fn propagation_policy(&self) -> PropagationPolicy {
        PropagationPolicy {
            forced_bump: self.versioning.forced_bump,
        }
    }

    #[must_use]
    pub const fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.testing.timeout_secs)
    }

    /// Filesystem workspace rooted at `root` configured from this file.
    #[must_use]
    pub fn fs_workspace(&self, root: &Path) -> FsWorkspace {
        FsWorkspace::new(root, self.namespace())
            .with_changelog_file(&self.publish.changelog)
            .with_publish_command(&self.publish.command)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<String>,
}

fn parse_error(path: &Path, err: &toml::de::Error) -> TandemError {
    TandemError::Config {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

pub fn load_project_config(workspace_root: &Path) -> Result<ProjectConfig> {
    let path = workspace_root.join(PROJECT_CONFIG_PATH);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(toml::from_str::<ProjectConfig>(&content).map_err(|e| parse_error(&path, &e))?)
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("tandem/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(toml::from_str::<UserConfig>(&content).map_err(|e| parse_error(&path, &e))?)
}

/// Pick the workspace root: CLI flag, then `TANDEM_WORKSPACE`, then the
/// user config, then the current directory (or its parent when the current
/// directory is itself a package).
#[must_use]
pub fn resolve_workspace(
    cli: Option<PathBuf>,
    env_workspace: Option<String>,
    user: &UserConfig,
    cwd: &Path,
) -> PathBuf {
    if let Some(dir) = cli {
        return dir;
    }
    if let Some(dir) = env_workspace.filter(|d| !d.trim().is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = &user.workspace {
        return dir.clone();
    }
    if cwd.join(MANIFEST_FILE).is_file() {
        if let Some(parent) = cwd.parent() {
            return parent.to_path_buf();
        }
    }
    cwd.to_path_buf()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub workspace: PathBuf,
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn resolve_config(
    cli_workspace: Option<PathBuf>,
    cli_json: bool,
    cwd: &Path,
) -> Result<EffectiveConfig> {
    let user = load_user_config()?;
    let workspace = resolve_workspace(cli_workspace, env::var("TANDEM_WORKSPACE").ok(), &user, cwd);
    let project = load_project_config(&workspace)?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format);

    Ok(EffectiveConfig {
        workspace,
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<String>, env_format: Option<String>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn default_namespace() -> String {
    "@candlelib/".to_string()
}

const fn default_forced_bump() -> Part {
    Part::Patch
}

const fn default_timeout_secs() -> u64 {
    600
}

fn default_publish_command() -> String {
    DEFAULT_PUBLISH_COMMAND.to_string()
}

fn default_changelog() -> String {
    DEFAULT_CHANGELOG_FILE.to_string()
}
