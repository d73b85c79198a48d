//! Commit message classification.
//!
//! A classifier answers three questions about one commit message: does it
//! announce a breaking change, a feature, and should it be copied into the
//! changelog. The default [`PrefixClassifier`] uses message-prefix markers:
//!
//! - breaking: message starts with `#breaking`, `#break`, `Breaking`, `break`...
//! - feature:  message starts with `#feature`, `#feat`, `Feature`, `feat`...
//! - changelog: any line of the message ends with `#changelog`

use std::sync::LazyLock;

use regex::Regex;

/// Flags extracted from a single commit message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub breaking: bool,
    pub feature: bool,
    pub changelog: bool,
}

/// Strategy for turning a commit message into a [`Classification`].
pub trait CommitClassifier {
    fn classify(&self, message: &str) -> Classification;
}

impl<F> CommitClassifier for F
where
    F: Fn(&str) -> Classification,
{
    fn classify(&self, message: &str) -> Classification {
        self(message)
    }
}

static BREAKING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?[Bb]reak(ing)?").expect("breaking pattern is valid"));

static FEATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?[Ff]eat(ure)?").expect("feature pattern is valid"));

static CHANGELOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)#changelog\s*$").expect("changelog pattern is valid"));

/// Message-prefix classifier used unless a caller supplies its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixClassifier;

impl CommitClassifier for PrefixClassifier {
    fn classify(&self, message: &str) -> Classification {
        Classification {
            breaking: BREAKING.is_match(message),
            feature: FEATURE.is_match(message),
            changelog: CHANGELOG.is_match(message),
        }
    }
}

/// Split a changelog-marked message into the text that follows the marker.
///
/// The body after the `#changelog` line is folded into one line. Messages
/// whose marker is the last line fall back to the marker line itself with
/// the marker removed.
#[must_use]
pub fn changelog_text(message: &str) -> String {
    let Some(marker) = CHANGELOG.find(message) else {
        return message.lines().next().unwrap_or_default().trim().to_string();
    };

    let line_start = message[..marker.start()].rfind('\n').map_or(0, |i| i + 1);
    let subject = message[line_start..marker.start()].trim();

    let body = message[marker.end()..]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if body.is_empty() {
        subject.to_string()
    } else {
        body
    }
}
