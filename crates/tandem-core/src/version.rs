//! Semantic version triples with release channels.
//!
//! # Format
//!
//! `MAJOR.MINOR.PATCH[-CHANNEL]`, e.g. `1.4.0`, `0.2.7-beta`. Exactly one
//! `-` separates the numeric part from the channel label.
//!
//! # Ordering
//!
//! Numeric components compare first (major, minor, patch). On numeric
//! equality the channel precedence table decides:
//!
//! | channel        | rank   |
//! |----------------|--------|
//! | (stable)       | 100000 |
//! | `release`      | 50000  |
//! | `beta`         | 25000  |
//! | `alpha`        | 12500  |
//! | `experimental` | 6250   |
//! | anything else  | 0      |
//!
//! Unknown labels share rank 0 and are ordered by label text so that the
//! ordering stays total and consistent with equality.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TandemError;

const CHANNEL_DELIMITER: char = '-';
const COMPONENT_DELIMITER: char = '.';

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Release channel label attached to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    Stable,
    Release,
    Beta,
    Alpha,
    Experimental,
    Other(String),
}

impl Channel {
    /// Parse a channel label. The empty label is [`Channel::Stable`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "" => Self::Stable,
            "release" => Self::Release,
            "beta" => Self::Beta,
            "alpha" => Self::Alpha,
            "experimental" => Self::Experimental,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Stable => "",
            Self::Release => "release",
            Self::Beta => "beta",
            Self::Alpha => "alpha",
            Self::Experimental => "experimental",
            Self::Other(label) => label,
        }
    }

    /// Precedence used as the tie-break for numerically equal versions.
    #[must_use]
    pub const fn rank(&self) -> u32 {
        match self {
            Self::Stable => 100_000,
            Self::Release => 50_000,
            Self::Beta => 25_000,
            Self::Alpha => 12_500,
            Self::Experimental => 6_250,
            Self::Other(_) => 0,
        }
    }
}

impl Ord for Channel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.label().cmp(other.label()))
    }
}

impl PartialOrd for Channel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Component of a version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Part {
    Major,
    Minor,
    Patch,
}

/// Largest accepted version component (`2^53 - 1`, the npm registry limit).
/// Keeping parsed components below `u64::MAX` means an increment can never
/// overflow.
pub const MAX_COMPONENT: u64 = (1 << 53) - 1;

/// A `(major, minor, patch)` triple plus release channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub channel: Channel,
}

impl Version {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            channel: Channel::Stable,
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Parse `MAJOR.MINOR.PATCH[-CHANNEL]`.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::MalformedVersion`] when fewer than three numeric
    /// components are present or a component is not a non-negative integer
    /// no greater than [`MAX_COMPONENT`].
    pub fn parse(value: &str) -> Result<Self, TandemError> {
        let malformed = || TandemError::MalformedVersion {
            value: value.to_string(),
            package: None,
        };

        let trimmed = value.trim();
        let (numeric, channel) = trimmed
            .split_once(CHANNEL_DELIMITER)
            .unwrap_or((trimmed, ""));

        let components = numeric
            .split(COMPONENT_DELIMITER)
            .map(|component| {
                component
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n <= MAX_COMPONENT)
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(malformed)?;

        let [major, minor, patch, ..] = components[..] else {
            return Err(malformed());
        };

        Ok(Self {
            major,
            minor,
            patch,
            channel: Channel::from_label(channel),
        })
    }

    /// Increment one component, zeroing the lower ones.
    #[must_use]
    pub fn increment(&self, part: Part) -> Self {
        let mut next = self.clone();
        match part {
            Part::Major => {
                next.major = next.major.saturating_add(1);
                next.minor = 0;
                next.patch = 0;
            }
            Part::Minor => {
                next.minor = next.minor.saturating_add(1);
                next.patch = 0;
            }
            Part::Patch => next.patch = next.patch.saturating_add(1),
        }
        next
    }

    /// Apply the breaking/feature/patch bump policy.
    ///
    /// Post-1.0 versions (major > 0) always use release mode, so a breaking
    /// change becomes a major bump there. Before 1.0 a breaking change only
    /// bumps the minor component unless `release_mode` is requested.
    #[must_use]
    pub fn bump(&self, breaking: bool, feature: bool, release_mode: bool) -> Self {
        let release_mode = release_mode || self.major > 0;
        let part = match (breaking, feature) {
            (true, _) if release_mode => Part::Major,
            (true, _) | (false, true) => Part::Minor,
            (false, false) => Part::Patch,
        };
        self.increment(part)
    }

}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| self.channel.cmp(&other.channel))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.channel != Channel::Stable {
            write!(f, "{CHANNEL_DELIMITER}{}", self.channel)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = TandemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// The greater of two versions under [`Version`]'s total order.
#[must_use]
pub fn latest<'a>(a: &'a Version, b: &'a Version) -> &'a Version {
    if b > a { b } else { a }
}

// ---------------------------------------------------------------------------
// Declared dependency constraints
// ---------------------------------------------------------------------------

const RANGE_OPERATORS: [&str; 7] = [">=", "<=", "^", "~", "=", ">", "v"];

/// Split a declared constraint such as `^1.0.5` into `("^", "1.0.5")`.
#[must_use]
pub fn split_constraint(declared: &str) -> (&str, &str) {
    let trimmed = declared.trim();
    for op in RANGE_OPERATORS {
        if let Some(rest) = trimmed.strip_prefix(op) {
            return (op, rest.trim_start());
        }
    }
    ("", trimmed)
}

/// Rewrite a declared constraint to point at `version`, keeping its operator.
#[must_use]
pub fn rewrite_constraint(declared: &str, version: &Version) -> String {
    let (op, _) = split_constraint(declared);
    format!("{op}{version}")
}
