use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A directory server release, e.g. `9.2.0.1`.
///
/// Ordering is lexicographic over the four components, which matches the
/// server's own release ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub point_release: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32, point_release: u32) -> Self {
        Version {
            major,
            minor,
            patch,
            point_release,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid server version '{input}': {reason}")]
pub struct VersionParseError {
    input: String,
    reason: &'static str,
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Accepts `major.minor.patch` or `major.minor.patch.point`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| VersionParseError {
            input: s.to_string(),
            reason,
        };
        let parts = s
            .trim()
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| err("components must be non-negative integers"))?;
        match parts.as_slice() {
            [major, minor, patch] => Ok(Version::new(*major, *minor, *patch, 0)),
            [major, minor, patch, point] => Ok(Version::new(*major, *minor, *patch, *point)),
            _ => Err(err("expected three or four dot-separated components")),
        }
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.point_release
        )
    }
}
