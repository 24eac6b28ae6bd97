//! Symbolic resource identifiers.
//!
//! Ids are chosen at definition time (`LMSDatabase`, `CourseProgress`) and
//! stay stable across runs. They order byte-wise, which is the ordering every
//! stage uses for deterministic output.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Resource identifier - unique within one stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a validated id
    ///
    /// # Errors
    ///
    /// Returns error if the id is empty or contains whitespace or control
    /// characters
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidId {
                id,
                reason: "id is empty".to_string(),
            });
        }
        if let Some(c) = id.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(CoreError::InvalidId {
                reason: format!("contains {c:?}"),
                id,
            });
        }
        Ok(Self(id))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
