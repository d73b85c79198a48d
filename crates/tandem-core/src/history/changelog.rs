//! Changelog entry assembly.
//!
//! An entry block looks like:
//!
//! ```text
//! ## [v1.4.0] - 2026-10-19
//!
//! - [2026-10-12] **breaking change**
//!
//!     Loader API moved to load().
//!
//! - [2026-10-10]
//!
//!     Fixed crash on empty input.
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate};

use super::classify::changelog_text;
use super::scan::ChangelogCommit;
use crate::version::Version;

/// `git log` default date format, e.g. `Mon Oct 12 09:30:00 2026 +0200`.
const GIT_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y %z";

/// Parse a commit date into a calendar day.
///
/// Accepts git's default format, RFC 3339 and RFC 2822.
#[must_use]
pub fn commit_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::<FixedOffset>::parse_from_str(raw, GIT_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.date_naive())
}

/// Render one changelog bullet. Unparsable commit dates fall back to `today`.
#[must_use]
pub fn bullet(entry: &ChangelogCommit, today: NaiveDate) -> String {
    let day = commit_day(&entry.commit.date).unwrap_or(today);
    let breaking = if entry.breaking {
        " **breaking change** "
    } else {
        ""
    };
    format!(
        "- [{}]{breaking}\n\n    {}",
        day.format("%Y-%m-%d"),
        changelog_text(&entry.commit.message)
    )
}

/// Render the entry block for `version`, or `None` when nothing is marked.
#[must_use]
pub fn entry(version: &Version, commits: &[ChangelogCommit], today: NaiveDate) -> Option<String> {
    if commits.is_empty() {
        return None;
    }

    let bullets = commits
        .iter()
        .map(|c| bullet(c, today))
        .collect::<Vec<_>>()
        .join("\n\n");

    Some(format!(
        "## [v{version}] - {}\n\n{bullets}\n",
        today.format("%Y-%m-%d")
    ))
}
