//! Version types for KEYSTONE.
//!
//! Capability tables are versioned independently of the planner; plans record
//! the table version they were synthesized against.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Version {
    /// Major component
    pub major: u64,
    /// Minor component
    pub minor: u64,
    /// Patch component
    pub patch: u64,
}

impl Version {
    /// Create a new version
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `MAJOR.MINOR.PATCH`
    ///
    /// # Errors
    ///
    /// Returns error unless there are exactly three numeric components
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let mut components = s.split('.').map(|part| {
            part.parse::<u64>()
                .map_err(|_| VersionError::InvalidComponent(part.to_string()))
        });
        match (components.next(), components.next(), components.next(), components.next()) {
            (Some(major), Some(minor), Some(patch), None) => Ok(Self::new(major?, minor?, patch?)),
            _ => Err(VersionError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Capability table version errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// Not three dot-separated components
    #[error("version {0:?} is not MAJOR.MINOR.PATCH")]
    InvalidFormat(String),
    /// A component is not an unsigned integer
    #[error("version component {0:?} is not a number")]
    InvalidComponent(String),
}
