//! Commit history analysis.
//!
//! # Pipeline
//!
//! ```text
//! git log --no-decorate text
//!        ↓  parse_log()
//! Vec<CommitRecord> (newest first)
//!        ↓  scan() with a CommitClassifier + MarkerPolicy
//! HistorySummary { breaking, feature, commit_drift, recovered_version, changelog }
//! ```
//!
//! Classification rules live behind [`CommitClassifier`] and the
//! version-marker rule behind [`MarkerPolicy`], so either can be swapped
//! without touching the graph or propagation code.

pub mod changelog;
pub mod classify;
pub mod marker;
pub mod scan;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub use classify::{Classification, CommitClassifier, PrefixClassifier};
pub use marker::MarkerPolicy;
pub use scan::{HistorySummary, scan};

/// One commit extracted from the log. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub date: String,
    pub message: String,
}

// Message lines are indented by git, so only a column-0 `commit` starts a unit.
static COMMIT_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^commit\s+").expect("commit split pattern is valid"));

static COMMIT_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^(?P<hash>[^\n]*)\n(?:\s*merge\s*:[^\n]*\n)?\s*author\s*:(?P<author>[^\n]*)\n\s*date\s*:(?P<date>[^\n]*)\n(?P<message>.+)$",
    )
    .expect("commit unit pattern is valid")
});

/// Split raw newest-first log text into commit records.
///
/// Units that do not match the `commit`/`Author:`/`Date:` shape are dropped
/// silently; a malformed commit never aborts a run.
#[must_use]
pub fn parse_log(raw: &str) -> Vec<CommitRecord> {
    COMMIT_SPLIT
        .split(raw)
        .filter_map(|unit| {
            let caps = COMMIT_UNIT.captures(unit)?;
            let message = dedent(&caps["message"]);
            if message.is_empty() {
                return None;
            }
            Some(CommitRecord {
                hash: caps["hash"].trim().to_string(),
                author: caps["author"].trim().to_string(),
                date: caps["date"].trim().to_string(),
                message,
            })
        })
        .collect()
}

/// Strip git's message indentation and surrounding blank lines.
fn dedent(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
