//! Version-marker commit recognition.
//!
//! A version-marker commit records the last version assignment of a package
//! and stops classification: older commits are already covered by that
//! version. Matching on message text is fragile (renames, reused version
//! strings), so the rule is a configurable [`MarkerPolicy`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::version::Version;

static LEADING_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?\d+\.\d+\.\d+").expect("leading version pattern is valid")
});

static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.\d+\.\d+(?:-[A-Za-z][A-Za-z0-9]*)?").expect("version token pattern is valid")
});

/// Rule deciding whether a commit is the package's last version marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerPolicy {
    /// Message mentions both the package name and its declared version.
    NameAndVersion,
    /// Message begins with an explicit version token (`1.2.3`, `v1.2.3`).
    VersionPrefix,
    /// Either of the above.
    #[default]
    Either,
}

impl MarkerPolicy {
    #[must_use]
    pub fn is_marker(self, message: &str, package: &str, declared_version: &str) -> bool {
        let name_and_version = || {
            !declared_version.is_empty()
                && message.contains(package)
                && message.contains(declared_version)
        };
        let prefix = || LEADING_VERSION.is_match(message);

        match self {
            Self::NameAndVersion => name_and_version(),
            Self::VersionPrefix => prefix(),
            Self::Either => name_and_version() || prefix(),
        }
    }
}

/// The version recorded by a marker commit: the last version token on the
/// subject line, if it parses.
#[must_use]
pub fn recover_version(message: &str) -> Option<Version> {
    let subject = message.lines().next()?;
    VERSION_TOKEN
        .find_iter(subject)
        .last()
        .and_then(|token| Version::parse(token.as_str()).ok())
}
