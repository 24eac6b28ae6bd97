//! Forward references between resources.
//!
//! A reference marks one attribute of its source as a substitution point that
//! the executor fills with an output of the target once the target exists.
//! Declaring it is also what orders the target before the source.

use crate::id::ResourceId;
use serde::{Deserialize, Serialize};

/// How the source uses the referenced resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Source only reads from the target
    #[default]
    Read,
    /// Source reads from and writes to the target
    ReadWrite,
}

impl Access {
    /// Whether write actions may be granted for this access
    #[must_use]
    pub const fn allows_write(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// A late-bound pointer from `source_id`'s attribute to `target_id`'s output
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    source_id: ResourceId,
    target_id: ResourceId,
    attribute_path: String,
    output: String,
    #[serde(default)]
    access: Access,
}

impl Reference {
    /// Create a read-only reference
    #[must_use]
    pub fn new(
        source_id: ResourceId,
        target_id: ResourceId,
        attribute_path: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            source_id,
            target_id,
            attribute_path: attribute_path.into(),
            output: output.into(),
            access: Access::Read,
        }
    }

    /// Set the access mode
    #[must_use]
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Resource whose attribute is substituted
    #[must_use]
    pub fn source_id(&self) -> &ResourceId {
        &self.source_id
    }

    /// Resource that must be realized first
    #[must_use]
    pub fn target_id(&self) -> &ResourceId {
        &self.target_id
    }

    /// Dotted path of the substituted attribute on the source
    #[must_use]
    pub fn attribute_path(&self) -> &str {
        &self.attribute_path
    }

    /// Output of the target that fills the attribute
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Declared access mode
    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Placeholder text the executor replaces, e.g. `${CourseProgress.tableName}`
    #[must_use]
    pub fn placeholder(&self) -> String {
        format!("${{{}.{}}}", self.target_id, self.output)
    }
}
