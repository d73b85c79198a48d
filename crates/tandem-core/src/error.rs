//! Error taxonomy for a resolution run.
//!
//! Fatal failures are [`TandemError`] values and abort the run. Per-package
//! problems that only make a package ineligible (dirty tree, failing tests)
//! are [`Ineligibility`] values so a run can collect every one of them before
//! deciding whether to fail.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    ConfigParseError,
    MalformedVersion,
    UnresolvedDependency,
    ManifestUnreadable,
    HistoryUnreadable,
    DirtyWorkingTree,
    TestFailure,
    NotEligible,
    StageFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MalformedVersion => "E2001",
            Self::UnresolvedDependency => "E2002",
            Self::ManifestUnreadable => "E2003",
            Self::HistoryUnreadable => "E2004",
            Self::DirtyWorkingTree => "E3001",
            Self::TestFailure => "E3002",
            Self::NotEligible => "E3003",
            Self::StageFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MalformedVersion => "Malformed version string",
            Self::UnresolvedDependency => "Dependency could not be located",
            Self::ManifestUnreadable => "Package manifest unreadable",
            Self::HistoryUnreadable => "Commit history unreadable",
            Self::DirtyWorkingTree => "Uncommitted changes in package",
            Self::TestFailure => "Package tests failed",
            Self::NotEligible => "Packages are not eligible for versioning",
            Self::StageFailed => "Staging release output failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .tandem/config.toml and retry."),
            Self::MalformedVersion => {
                Some("Versions must have three numeric components, e.g. 1.2.3 or 1.2.3-beta.")
            }
            Self::UnresolvedDependency => {
                Some("Check out the missing package into the workspace directory.")
            }
            Self::ManifestUnreadable => Some("Verify package.json exists and is valid JSON."),
            Self::HistoryUnreadable => Some("Verify the package directory is a git repository."),
            Self::DirtyWorkingTree => Some("Commit or stash local changes, then retry."),
            Self::TestFailure => Some("Fix the failing tests or rerun with --dry-run to preview."),
            Self::NotEligible => Some("Resolve the reported issues or rerun with --dry-run."),
            Self::StageFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other `tandem` process releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Why a package cannot be versioned in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ineligibility {
    /// The working tree has uncommitted changes; tests were not run.
    DirtyWorkingTree {
        package: String,
        /// Changed or untracked paths, relative to the package.
        paths: Vec<String>,
    },
    /// The test command failed, timed out, or could not be spawned.
    TestFailure { package: String, detail: String },
}

impl Ineligibility {
    #[must_use]
    pub fn package(&self) -> &str {
        match self {
            Self::DirtyWorkingTree { package, .. } | Self::TestFailure { package, .. } => package,
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DirtyWorkingTree { .. } => ErrorCode::DirtyWorkingTree,
            Self::TestFailure { .. } => ErrorCode::TestFailure,
        }
    }
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirtyWorkingTree { package, paths } => write!(
                f,
                "{package} has uncommitted changes and cannot be versioned:\n{}",
                paths.join("\n")
            ),
            Self::TestFailure { package, detail } => {
                write!(f, "{package} has failed tests: {detail}")
            }
        }
    }
}

/// Fatal errors of a resolution run.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    /// A version string could not be parsed into a numeric triple.
    #[error("malformed version `{value}`{}", context_suffix(.package.as_deref()))]
    MalformedVersion {
        value: String,
        /// Package whose manifest or history held the value, when known.
        package: Option<String>,
    },

    /// A declared dependency could not be located by the manifest store.
    #[error("cannot locate package {name}{}", required_by_suffix(.required_by.as_deref()))]
    UnresolvedDependency {
        name: String,
        /// The package that declared the dependency; `None` for run roots.
        required_by: Option<String>,
    },

    /// A configuration file exists but could not be read or parsed.
    #[error("failed to load config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// A manifest exists but could not be read or decoded.
    #[error("failed to read manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    /// The commit log or working tree status of a package could not be read.
    #[error("failed to read history of {package}: {message}")]
    History { package: String, message: String },

    /// One or more packages failed eligibility in a non-simulated run.
    #[error("cannot version: {} package(s) not eligible", .failures.len())]
    NotEligible { failures: Vec<Ineligibility> },

    /// A staged output (manifest, changelog, deferred action) failed to persist.
    #[error("failed to stage {what} for {package}: {message}")]
    Stage {
        package: String,
        what: &'static str,
        message: String,
    },

    /// Another run holds the workspace lock.
    #[error("workspace lock timed out after {waited:?} at {}", path.display())]
    Lock {
        path: PathBuf,
        waited: std::time::Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TandemError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedVersion { .. } => ErrorCode::MalformedVersion,
            Self::UnresolvedDependency { .. } => ErrorCode::UnresolvedDependency,
            Self::Config { .. } => ErrorCode::ConfigParseError,
            Self::Manifest { .. } => ErrorCode::ManifestUnreadable,
            Self::History { .. } => ErrorCode::HistoryUnreadable,
            Self::NotEligible { .. } => ErrorCode::NotEligible,
            Self::Stage { .. } => ErrorCode::StageFailed,
            Self::Lock { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Attach the owning package to a version error raised without one.
    #[must_use]
    pub fn for_package(self, name: &str) -> Self {
        match self {
            Self::MalformedVersion {
                value,
                package: None,
            } => Self::MalformedVersion {
                value,
                package: Some(name.to_string()),
            },
            other => other,
        }
    }
}

fn context_suffix(package: Option<&str>) -> String {
    package.map_or_else(String::new, |p| format!(" in {p}"))
}

fn required_by_suffix(required_by: Option<&str>) -> String {
    required_by.map_or_else(String::new, |p| format!(" required by {p}"))
}
